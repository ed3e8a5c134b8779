pub mod enrich;
pub mod guards;
pub mod matcher;
pub mod ranker;
pub mod search;
pub mod similarity;
