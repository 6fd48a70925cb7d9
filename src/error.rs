use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("timestamp inversion: {0}")]
    Ordering(String),

    #[error("pcap export error: {0}")]
    Export(#[from] pcap_file::PcapError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reject a `min > max` range before anything is generated
pub(crate) fn check_range<T: PartialOrd + std::fmt::Debug>(
    name: &str,
    (min, max): (T, T),
) -> Result<()> {
    if min > max {
        Err(Error::InvalidArgument(format!(
            "{name}: minimum {min:?} is greater than maximum {max:?}"
        )))
    } else {
        Ok(())
    }
}
