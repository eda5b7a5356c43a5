use afw_operation::InvokeError;

/// Result of a non-throwing call: exactly one of `data` and `error` is set.
#[derive(Debug)]
pub struct Outcome<T> {
    result: Result<T, InvokeError>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self { result: Ok(data) }
    }

    pub fn err(error: InvokeError) -> Self {
        Self { result: Err(error) }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&InvokeError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, InvokeError> {
        self.result
    }
}

impl<T> From<Result<T, InvokeError>> for Outcome<T> {
    fn from(result: Result<T, InvokeError>) -> Self {
        Self { result }
    }
}
