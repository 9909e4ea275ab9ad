pub mod app;

pub mod backup;

pub mod integrity;

pub mod state;

pub mod transaction;

#[cfg(test)]
pub(crate) mod test_helpers;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
