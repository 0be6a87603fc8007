pub mod universalis; // Universalis market board history REST client

pub use universalis::{
    FetchError, HistoryBatch, HistoryQuery, HistorySource, ItemHistory, SaleEntry,
    UniversalisClient,
};
