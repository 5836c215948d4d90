pub mod compliance;
pub mod directory;
pub mod documents;
pub mod exchange;
pub mod graph;
pub mod intune;
pub mod security;
pub mod sharepoint;
