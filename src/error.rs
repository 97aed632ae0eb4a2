use std::fmt;

#[derive(Debug)]
pub enum FolioError {
    MeasurementUnavailable(String),
    SurfaceUnavailable(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for FolioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolioError::MeasurementUnavailable(message) => {
                write!(f, "layout measurement unavailable: {}", message)
            }
            FolioError::SurfaceUnavailable(message) => {
                write!(f, "print surface unavailable: {}", message)
            }
            FolioError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            FolioError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for FolioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FolioError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FolioError {
    fn from(value: std::io::Error) -> Self {
        FolioError::Io(value)
    }
}
