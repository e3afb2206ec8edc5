/// Display global error message in unified format
#[derive(Debug, Clone)]
pub struct Error(String, Option<String>);

impl Error {
    pub fn new(message: &str, details: Option<&str>) -> Self {
        Error(message.to_string(), details.map(|d| d.to_string()))
    }
}

/// Display the message and details, as sort of a hint
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}\n\n{}",
            self.0,
            console::style(self.1.clone().unwrap_or("".into())).dim()
        )
    }
}

/// Implement std::error::Error trait for Error
impl std::error::Error for Error {}

/// Automatically convert all eyre error reports
///
/// The outermost context becomes the message, the root cause becomes the details.
impl From<eyre::ErrReport> for Error {
    fn from(error: eyre::ErrReport) -> Self {
        log::error!("{error:?}");

        error.downcast::<Error>().unwrap_or_else(|err| {
            let root_cause = err.root_cause().to_string();
            let message = err.to_string();

            if root_cause == message {
                Error::new(&message, None)
            } else {
                Error::new(&message, Some(&root_cause))
            }
        })
    }
}
