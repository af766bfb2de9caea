pub mod b_plus_tree;
pub mod errors;
pub mod index_iterator;
pub mod key;
