use std::fmt;
use std::io::{self, Read};

/// Attachment payload for an upload
pub enum AttachmentBody {
    Bytes(Vec<u8>),
    /// Streamed without loading the whole payload into memory
    Stream(Box<dyn Read + Send>),
}

impl AttachmentBody {
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        AttachmentBody::Stream(Box::new(reader))
    }
}

impl From<Vec<u8>> for AttachmentBody {
    fn from(bytes: Vec<u8>) -> Self {
        AttachmentBody::Bytes(bytes)
    }
}

impl From<&[u8]> for AttachmentBody {
    fn from(bytes: &[u8]) -> Self {
        AttachmentBody::Bytes(bytes.to_vec())
    }
}

impl fmt::Debug for AttachmentBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            AttachmentBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Downloaded attachment. Reading pulls from the open connection, which is
/// released when the stream is dropped.
pub struct AttachmentStream {
    content_type: Option<String>,
    content_length: Option<u64>,
    reader: Box<dyn Read + Send>,
}

impl AttachmentStream {
    pub(crate) fn new(
        content_type: Option<String>,
        content_length: Option<u64>,
        reader: Box<dyn Read + Send>,
    ) -> Self {
        Self {
            content_type,
            content_length,
            reader,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the rest of the attachment into memory
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Read for AttachmentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for AttachmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentStream")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
