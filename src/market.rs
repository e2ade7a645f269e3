pub mod fixture;
pub mod provider;
pub mod retry;

pub use fixture::FixedPriceProvider;
pub use provider::{DividendPayment, PricePoint, PriceProvider};
pub use retry::RetryingProvider;
