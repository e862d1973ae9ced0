pub mod cdp;
pub mod courts;
pub mod executor;
pub mod search;
pub mod selectors;
pub mod steps;

pub use cdp::{CdpPage, PortalBrowser};
pub use courts::{Court, COURTS};
pub use executor::PortalExecutor;
pub use search::SearchCriteria;
