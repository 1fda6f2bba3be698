use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use solquote_core::domain::contractor::ContractorId;
use solquote_core::domain::quote::{
    ContractorQuote, ContractorQuoteId, FinancialBreakdown, LineItem, ReviewStatus,
};
use solquote_core::domain::request::QuoteRequestId;
use solquote_core::ports::{ContractorQuoteStore, StoreError};

use super::{decimal, optional_text, parse_enum, text, timestamp, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT id, request_id, contractor_id, system_size,
        price_per_unit_capacity, base_price, markup_amount, total_user_price,
        commission_amount, contractor_net_amount, platform_revenue, review_status,
        review_notes, notes, created_at, updated_at
     FROM contractor_quote";

pub struct SqlContractorQuoteRepository {
    pool: DbPool,
}

impl SqlContractorQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        sql: &str,
        binds: &[&str],
    ) -> Result<Option<ContractorQuote>, RepositoryError> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let row = query.fetch_optional(&self.pool).await?;

        match row {
            Some(ref row) => {
                let mut quote = row_to_quote(row)?;
                quote.line_items = self.load_line_items(&quote.id).await?;
                Ok(Some(quote))
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<Vec<ContractorQuote>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE request_id = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut quotes = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut quote = row_to_quote(row)?;
            quote.line_items = self.load_line_items(&quote.id).await?;
            quotes.push(quote);
        }
        Ok(quotes)
    }

    async fn load_line_items(
        &self,
        quote_id: &ContractorQuoteId,
    ) -> Result<Vec<LineItem>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT position, item_name, quantity, unit_price, total_price, platform_commission,
                    platform_markup, user_price, vendor_net_price, vat_amount
             FROM quote_line_item WHERE quote_id = ? ORDER BY position ASC, id ASC",
        )
        .bind(&quote_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_line_item).collect::<Result<Vec<_>, _>>()
    }

    /// Quote row and line items go in one transaction; a unique violation on
    /// (request_id, contractor_id) rolls the whole submission back.
    async fn insert(&self, quote: &ContractorQuote) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let breakdown = &quote.breakdown;

        sqlx::query(
            "INSERT INTO contractor_quote (id, request_id, contractor_id, system_size,
                                           price_per_unit_capacity, base_price, markup_amount,
                                           total_user_price, commission_amount,
                                           contractor_net_amount, platform_revenue,
                                           review_status, review_notes, notes,
                                           created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&quote.id.0)
        .bind(&quote.request_id.0)
        .bind(&quote.contractor_id.0)
        .bind(quote.system_size.to_string())
        .bind(quote.price_per_unit_capacity.to_string())
        .bind(breakdown.base_price.to_string())
        .bind(breakdown.markup_amount.to_string())
        .bind(breakdown.total_user_price.to_string())
        .bind(breakdown.commission_amount.to_string())
        .bind(breakdown.contractor_net_amount.to_string())
        .bind(breakdown.platform_revenue.to_string())
        .bind(quote.review_status.as_str())
        .bind(&quote.review_notes)
        .bind(&quote.notes)
        .bind(quote.created_at.to_rfc3339())
        .bind(quote.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for item in &quote.line_items {
            sqlx::query(
                "INSERT INTO quote_line_item (quote_id, position, item_name, quantity, unit_price,
                                              total_price, platform_commission, platform_markup,
                                              user_price, vendor_net_price, vat_amount)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&quote.id.0)
            .bind(i64::from(item.position))
            .bind(&item.item_name)
            .bind(item.quantity.to_string())
            .bind(item.unit_price.to_string())
            .bind(item.total_price.to_string())
            .bind(item.platform_commission.to_string())
            .bind(item.platform_markup.to_string())
            .bind(item.user_price.to_string())
            .bind(item.vendor_net_price.to_string())
            .bind(item.vat_amount.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, quote: &ContractorQuote) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE contractor_quote
             SET review_status = ?, review_notes = ?, notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(quote.review_status.as_str())
        .bind(&quote.review_notes)
        .bind(&quote.notes)
        .bind(quote.updated_at.to_rfc3339())
        .bind(&quote.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_quote(row: &SqliteRow) -> Result<ContractorQuote, RepositoryError> {
    Ok(ContractorQuote {
        id: ContractorQuoteId(text(row, "id")?),
        request_id: QuoteRequestId(text(row, "request_id")?),
        contractor_id: ContractorId(text(row, "contractor_id")?),
        system_size: decimal(row, "system_size")?,
        price_per_unit_capacity: decimal(row, "price_per_unit_capacity")?,
        breakdown: FinancialBreakdown {
            base_price: decimal(row, "base_price")?,
            markup_amount: decimal(row, "markup_amount")?,
            total_user_price: decimal(row, "total_user_price")?,
            commission_amount: decimal(row, "commission_amount")?,
            contractor_net_amount: decimal(row, "contractor_net_amount")?,
            platform_revenue: decimal(row, "platform_revenue")?,
        },
        review_status: parse_enum::<ReviewStatus>("review_status", &text(row, "review_status")?)?,
        review_notes: optional_text(row, "review_notes")?,
        notes: optional_text(row, "notes")?,
        line_items: Vec::new(),
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn row_to_line_item(row: &SqliteRow) -> Result<LineItem, RepositoryError> {
    let raw_position: i64 =
        row.try_get("position").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let position = u32::try_from(raw_position).map_err(|_| {
        RepositoryError::Decode(format!("line item position `{raw_position}` out of range"))
    })?;

    Ok(LineItem {
        item_name: text(row, "item_name")?,
        quantity: decimal(row, "quantity")?,
        unit_price: decimal(row, "unit_price")?,
        total_price: decimal(row, "total_price")?,
        platform_commission: decimal(row, "platform_commission")?,
        platform_markup: decimal(row, "platform_markup")?,
        user_price: decimal(row, "user_price")?,
        vendor_net_price: decimal(row, "vendor_net_price")?,
        vat_amount: decimal(row, "vat_amount")?,
        position,
    })
}

#[async_trait]
impl ContractorQuoteStore for SqlContractorQuoteRepository {
    async fn find_quote(
        &self,
        id: &ContractorQuoteId,
    ) -> Result<Option<ContractorQuote>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?");
        Ok(self.find_one(&sql, &[id.0.as_str()]).await?)
    }

    async fn find_by_request_and_contractor(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
    ) -> Result<Option<ContractorQuote>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE request_id = ? AND contractor_id = ?");
        Ok(self.find_one(&sql, &[request_id.0.as_str(), contractor_id.0.as_str()]).await?)
    }

    async fn list_for_request(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<Vec<ContractorQuote>, StoreError> {
        Ok(self.list(request_id).await?)
    }

    async fn insert_quote_with_line_items(
        &self,
        quote: &ContractorQuote,
    ) -> Result<(), StoreError> {
        Ok(self.insert(quote).await?)
    }

    async fn update_quote(&self, quote: &ContractorQuote) -> Result<(), StoreError> {
        Ok(self.update(quote).await?)
    }
}
