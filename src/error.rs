use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    QueryValidation(String),
    #[error("{0}")]
    DataValidation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Duplicate date for given country and date")]
    Duplicate {
        country_name: String,
        province: String,
        date: chrono::NaiveDate,
    },
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Storage {
            context: context.into(),
            source,
        }
    }

    /// HTTP-equivalent status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            Error::Parse(_)
            | Error::QueryValidation(_)
            | Error::DataValidation(_)
            | Error::Duplicate { .. } => 400,
            Error::NotFound(_) => 404,
            Error::Storage { .. } => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self.status() {
            400 => "Bad Request",
            404 => "Not Found",
            _ => "Internal Server Error",
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}
