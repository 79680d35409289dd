use std::io::ErrorKind;

use heartwire_core::StreamInfo;
use tokio::io::BufReader;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::{OutletError, Sample, WireMessage, read_frame};

/// Consumer end of an [`Outlet`](crate::Outlet) stream.
pub struct Inlet {
    reader: BufReader<TcpStream>,
    info: StreamInfo,
}

impl Inlet {
    /// Connects and waits for the stream metadata.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, OutletError> {
        let stream = TcpStream::connect(addr).await?;
        let mut reader = BufReader::new(stream);

        match read_frame(&mut reader).await? {
            WireMessage::StreamInfo(info) => Ok(Self { reader, info }),
            WireMessage::Sample(_) => Err(OutletError::UnexpectedMessage {
                expected: "stream info",
            }),
        }
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Next sample, or `None` once the outlet has closed the connection.
    pub async fn next_sample(&mut self) -> Result<Option<Sample>, OutletError> {
        match read_frame(&mut self.reader).await {
            Ok(WireMessage::Sample(sample)) => Ok(Some(sample)),
            Ok(WireMessage::StreamInfo(_)) => Err(OutletError::UnexpectedMessage {
                expected: "sample",
            }),
            Err(OutletError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}
