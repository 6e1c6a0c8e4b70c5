// Playlist curation: filter resolution, strategies, title rendering and the
// generation engine. Strategies reach data only through the `ClipCorpus` and
// `ClipRankingProvider` traits.

pub mod corpus;
pub mod engine;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod provider;
pub mod strategies;
pub mod title;
