// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`Device`] over any tokio byte stream.

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::DeviceError;

use super::Device;

/// A device reached through a reader and a writer.
///
/// Line settings of a serial port (baud rate, parity) are expected to be
/// configured outside the agent; [`LineDevice::open`] only opens the path.
///
/// # Examples
///
/// ```
/// use kaa_endpoint::device::{Device, LineDevice};
///
/// # async fn example() -> Result<(), kaa_endpoint::error::DeviceError> {
/// let mut device = LineDevice::new(&b"temp:21.5\r\n\n"[..], Vec::new());
/// assert_eq!(device.read_line().await?, "temp:21.5");
/// assert_eq!(device.read_line().await?, "");
///
/// device.write(b'g').await?;
/// assert_eq!(device.writer(), &b"g".to_vec());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LineDevice<R, W> {
    reader: R,
    writer: W,
    buf: Vec<u8>,
}

impl<R, W> LineDevice<R, W> {
    /// Wraps a buffered reader and a writer.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buf: Vec::new(),
        }
    }

    /// Returns the writer, e.g. to inspect what was written.
    #[must_use]
    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl LineDevice<BufReader<File>, File> {
    /// Opens a tty or file for reading and writing.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Io` if the path cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let writer = OpenOptions::new().read(true).write(true).open(path).await?;
        let reader = BufReader::new(writer.try_clone().await?);
        tracing::info!(path = %path.display(), "Opened device");
        Ok(Self::new(reader, writer))
    }
}

impl<R, W> Device for LineDevice<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn read_line(&mut self) -> Result<String, DeviceError> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Err(DeviceError::Closed);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(line.trim().to_string())
    }

    async fn write(&mut self, code: u8) -> Result<(), DeviceError> {
        self.writer.write_all(&[code]).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_trimmed_lines_until_closed() {
        let mut device = LineDevice::new(&b"temp:21.5\r\n  humidity:40 \n\n"[..], Vec::new());
        assert_eq!(device.read_line().await.unwrap(), "temp:21.5");
        assert_eq!(device.read_line().await.unwrap(), "humidity:40");
        assert_eq!(device.read_line().await.unwrap(), "");
        assert!(matches!(device.read_line().await, Err(DeviceError::Closed)));
    }

    #[tokio::test]
    async fn last_line_without_newline_is_returned() {
        let mut device = LineDevice::new(&b"temp:1"[..], Vec::new());
        assert_eq!(device.read_line().await.unwrap(), "temp:1");
        assert!(matches!(device.read_line().await, Err(DeviceError::Closed)));
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let mut device = LineDevice::new(&b"t\xffemp:1\n"[..], Vec::new());
        assert_eq!(device.read_line().await.unwrap(), "t\u{fffd}emp:1");
    }

    #[tokio::test]
    async fn writes_single_bytes() {
        let mut device = LineDevice::new(&b""[..], Vec::new());
        device.write(b'r').await.unwrap();
        device.write(b'f').await.unwrap();
        assert_eq!(device.writer(), &b"rf".to_vec());
    }
}
