/*!
Search-index integration: the rollcall alias client, the index-generation
resolver built on top of it, and the bulk indexer that moves file-centric
documents into and out of restricted/public generations (§4.5, §4.6, §6).
*/

pub mod indexer;
pub mod resolver;
pub mod rollcall;
pub mod single_flight;

pub use indexer::{FileDoc, Indexer, IndexerFactory};
pub use resolver::{IndexGenerationResolver, IndexTemplate};
pub use rollcall::RollcallClient;
pub use single_flight::SingleFlight;
