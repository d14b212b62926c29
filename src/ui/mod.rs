pub mod aggregate;
pub mod connection_bar;
pub mod doc_tree;
pub mod documents;
pub mod schema;
