/// Extension for dropping an error after logging it.
///
/// For call sites where a failure is worth a log line but must not take
/// down the surrounding flow, such as the post-run summary.
pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_log() {
        let ok: Result<u32, std::io::Error> = Ok(7);
        assert_eq!(ok.ok_log(), Some(7));

        let err: Result<u32, std::io::Error> = Err(std::io::Error::other("nope"));
        assert_eq!(err.ok_log(), None);
    }
}
