use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Clonable in-memory writer.
///
/// Hand one clone to [`Vm::with_output`](crate::Vm::with_output) and keep
/// another to read back what the program wrote.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Return the contents and clear the buffer.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_storage() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        write!(writer, "hello").expect("write");
        assert_eq!(buffer.contents(), "hello");
        assert_eq!(buffer.take(), "hello");
        assert_eq!(buffer.contents(), "");
    }
}
