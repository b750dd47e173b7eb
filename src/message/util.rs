use std::io::{self, prelude::*};

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
///
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Read a usize out of the given stream.
///
pub fn read_usize<R: Read>(stream: &mut R) -> io::Result<usize> {
    read_bytes_array(stream).map(usize::from_le_bytes)
}

/// Read the given number of bytes from a stream, into a vec.
///
pub fn read_bytes_vec<R: Read>(stream: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; size];
    stream.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Read the given (const) number of bytes from a stream, into an array.
///
pub fn read_bytes_array<R: Read, const SIZE: usize>(stream: &mut R) -> io::Result<[u8; SIZE]> {
    let mut buffer = [0; SIZE];
    stream.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Write a length-prefixed frame to a stream.
///
pub fn write_frame<W: Write>(stream: &mut W, message: &[u8]) -> io::Result<()> {
    stream.write_all(&message.len().to_le_bytes())?;
    stream.write_all(message)
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{ceil_log2, read_bytes_vec, read_usize, write_frame};

    #[test]
    fn ceil_log2_rounds_up() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(5), 3);
        assert_eq!(ceil_log2(8), 3);
        assert_eq!(ceil_log2(9), 4);
    }

    #[test]
    fn frame_can_be_read_back() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"halo").unwrap();

        let mut stream = &wire[..];
        let size = read_usize(&mut stream).unwrap();
        assert_eq!(read_bytes_vec(&mut stream, size).unwrap(), b"halo".to_vec());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut stream = &[1u8, 0, 0][..];
        assert!(read_usize(&mut stream).is_err());
    }
}
