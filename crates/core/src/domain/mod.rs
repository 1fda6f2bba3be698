pub mod assignment;
pub mod contractor;
pub mod pricing;
pub mod quote;
pub mod request;
