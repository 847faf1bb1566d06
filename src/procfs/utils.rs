use std::io::{BufRead, Seek, SeekFrom};

/// Rewinds the reader to the start, then applies the given parse function.
///
/// Samplers keep their procfs files open across ticks; seeking before each
/// read guarantees a parse failure on one tick cannot leave the cursor
/// mid-file for the next.
pub(crate) fn rewind_and_read<T, R>(
    file: &mut R,
    reader: impl FnOnce(&mut R) -> std::io::Result<T>,
) -> std::io::Result<T>
where
    R: BufRead + Seek,
{
    file.seek(SeekFrom::Start(0))?;
    reader(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};

    #[test]
    fn test_rewind_and_read_restarts_at_zero() {
        let mut reader = BufReader::new(Cursor::new(b"hello".to_vec()));

        let read_all = |r: &mut BufReader<Cursor<Vec<u8>>>| {
            let mut buf = String::new();
            r.read_to_string(&mut buf)?;
            Ok(buf)
        };

        assert_eq!(rewind_and_read(&mut reader, read_all).unwrap(), "hello");
        // The cursor sits at EOF now; a second call must still see everything.
        assert_eq!(rewind_and_read(&mut reader, read_all).unwrap(), "hello");
    }
}
