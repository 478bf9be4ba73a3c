pub mod interaction;
pub mod proposal;
pub mod subject;
