use bytes::Bytes;

use crate::error::ProcessError;

/// Transform applied by every worker to each request payload.
///
/// Implementations must be pure with respect to the pool: the only output is
/// the returned payload. Any `Fn(Bytes) -> Result<Bytes, ProcessError>`
/// closure is a processor.
pub trait Processor: Send + Sync + 'static {
    fn process(&self, payload: Bytes) -> Result<Bytes, ProcessError>;
}

/// Identity transform: the reply is the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Processor for Echo {
    fn process(&self, payload: Bytes) -> Result<Bytes, ProcessError> {
        Ok(payload)
    }
}

impl<F> Processor for F
where
    F: Fn(Bytes) -> Result<Bytes, ProcessError> + Send + Sync + 'static,
{
    fn process(&self, payload: Bytes) -> Result<Bytes, ProcessError> {
        self(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_returns_same_bytes() {
        let payload = Bytes::from_static(b"same");
        assert_eq!(Echo.process(payload.clone()).unwrap(), payload);
        assert!(Echo.process(Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn closures_are_processors() {
        let upper = |payload: Bytes| -> Result<Bytes, ProcessError> {
            Ok(Bytes::from(payload.to_ascii_uppercase()))
        };
        assert_eq!(upper.process(Bytes::from_static(b"abc")).unwrap(), "ABC");

        let failing = |_: Bytes| -> Result<Bytes, ProcessError> {
            Err(ProcessError::Recoverable("nope".to_string()))
        };
        assert!(matches!(
            failing.process(Bytes::new()),
            Err(ProcessError::Recoverable(_))
        ));
    }
}
