//! Server-mediated file transfer
//!
//! A `/file` offer turns the offering connection's read stream into an
//! inline binary sub-protocol: a 10-byte left-padded ASCII decimal size,
//! then exactly that many payload bytes. The whole payload is buffered and
//! only forwarded to the receiver once complete; a short transfer is
//! discarded and the receiver sees nothing.
//!
//! The handshake runs to completion on the offering connection's task, so
//! that connection reads no chat frames until the transfer ends. Other
//! connections are unaffected.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{AppError, RelayError};
use crate::message::{self, Frame};
use crate::types::Username;

/// Width of the ASCII decimal size header
pub const SIZE_HEADER_LEN: usize = 10;

/// Width of the `<filename>|<size>` header sent to the receiver
pub const FILE_HEADER_LEN: usize = 64;

/// Cap on a single payload read
pub const CHUNK_SIZE: usize = 4096;

/// Parse the 10-byte size header: left-padded ASCII decimal
pub fn parse_size_header(header: &[u8; SIZE_HEADER_LEN]) -> Result<u64, RelayError> {
    std::str::from_utf8(header)
        .map_err(|_| RelayError::InvalidSizeHeader)?
        .trim()
        .parse::<u64>()
        .map_err(|_| RelayError::InvalidSizeHeader)
}

/// Encode a size header the way clients send it
///
/// Exposed for front-ends and tests. Sizes above ten digits cannot be
/// framed; the largest representable size is 9_999_999_999 bytes.
pub fn encode_size_header(size: u64) -> [u8; SIZE_HEADER_LEN] {
    let text = format!("{:>width$}", size, width = SIZE_HEADER_LEN);
    debug_assert_eq!(text.len(), SIZE_HEADER_LEN);
    let mut header = [b' '; SIZE_HEADER_LEN];
    let bytes = text.as_bytes();
    header.copy_from_slice(&bytes[bytes.len() - SIZE_HEADER_LEN..]);
    header
}

/// Encode the 64-byte receiver header: `<filename>|<size>`, left-padded
pub fn encode_file_header(filename: &str, size: u64) -> Vec<u8> {
    let content = format!("{}|{}", filename, size);
    format!("{:>width$}", content, width = FILE_HEADER_LEN).into_bytes()
}

/// Parse a receiver header back into filename and size (client side)
pub fn parse_file_header(header: &[u8]) -> Result<(String, u64), RelayError> {
    let text = std::str::from_utf8(header).map_err(|_| RelayError::InvalidSizeHeader)?;
    let (filename, size) = text
        .trim_start()
        .rsplit_once('|')
        .ok_or(RelayError::InvalidSizeHeader)?;
    let size = size.trim().parse::<u64>().map_err(|_| RelayError::InvalidSizeHeader)?;
    Ok((filename.to_string(), size))
}

/// Accumulate up to `expected` payload bytes in bounded chunks
///
/// Stops early if the stream yields zero bytes; the caller compares the
/// returned length against `expected`. Never reads past the declared size.
pub async fn receive_payload<R>(reader: &mut R, expected: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    while (payload.len() as u64) < expected {
        let remaining = expected - payload.len() as u64;
        let cap = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = reader.read(&mut chunk[..cap]).await?;
        if n == 0 {
            break;
        }
        payload.extend_from_slice(&chunk[..n]);
    }
    Ok(payload)
}

/// Run one transfer handshake after the target has been resolved
///
/// Steps: tell the sender we are ready, read the size header, buffer the
/// payload, and on an exact-size read forward offer notice + header +
/// bytes to the receiver. Every protocol failure is reported to the sender
/// as a notice and aborts the session; only transport failures on the
/// sender's own channels are returned as errors.
pub async fn run<R>(
    reader: &mut R,
    sender: &Username,
    target: &Username,
    filename: &str,
    target_tx: mpsc::Sender<Frame>,
    reply_tx: &mpsc::Sender<Frame>,
) -> Result<(), AppError>
where
    R: AsyncRead + Unpin,
{
    reply_tx
        .send(message::server_notice("Ready to receive file size."))
        .await
        .map_err(|_| AppError::ChannelSend)?;
    debug!("Ready sent to {}, awaiting size header", sender);

    let mut size_header = [0u8; SIZE_HEADER_LEN];
    if let Err(e) = reader.read_exact(&mut size_header).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            warn!("{} closed before sending a size header", sender);
            reply_tx
                .send(message::server_notice(RelayError::MissingSizeHeader))
                .await
                .map_err(|_| AppError::ChannelSend)?;
            return Ok(());
        }
        return Err(e.into());
    }

    let size = match parse_size_header(&size_header) {
        Ok(size) => size,
        Err(e) => {
            warn!("Unparseable size header from {}", sender);
            reply_tx
                .send(message::server_notice(e))
                .await
                .map_err(|_| AppError::ChannelSend)?;
            return Ok(());
        }
    };
    debug!("Receiving '{}' ({} bytes) from {}", filename, size, sender);

    let payload = receive_payload(reader, size).await?;
    if (payload.len() as u64) < size {
        let err = RelayError::Incomplete {
            expected: size,
            received: payload.len() as u64,
        };
        warn!("Short transfer from {}: {}", sender, err);
        // Nothing reaches the receiver; the buffered bytes are dropped here
        reply_tx
            .send(message::server_notice(err))
            .await
            .map_err(|_| AppError::ChannelSend)?;
        return Ok(());
    }

    let delivered = async {
        target_tx.send(message::file_offer(sender, filename)).await?;
        target_tx
            .send(Frame::Binary(encode_file_header(filename, size)))
            .await?;
        target_tx.send(Frame::Binary(payload)).await
    }
    .await
    .is_ok();

    let result = if delivered {
        info!("File '{}' ({} bytes) relayed {} -> {}", filename, size, sender, target);
        message::server_notice(format!(
            "File '{}' sent successfully to {}.",
            filename, target
        ))
    } else {
        warn!("Receiver {} went away mid-forward", target);
        message::server_notice(format!("Failed to send file to {}.", target))
    };
    reply_tx.send(result).await.map_err(|_| AppError::ChannelSend)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[test]
    fn test_size_header_roundtrip() {
        let header = encode_size_header(1024);
        assert_eq!(&header, b"      1024");
        assert_eq!(parse_size_header(&header).unwrap(), 1024);

        assert_eq!(parse_size_header(&encode_size_header(0)).unwrap(), 0);
        assert_eq!(
            parse_size_header(&encode_size_header(9_999_999_999)).unwrap(),
            9_999_999_999
        );
    }

    #[test]
    fn test_size_header_rejects_garbage() {
        assert_eq!(
            parse_size_header(b"not a size"),
            Err(RelayError::InvalidSizeHeader)
        );
        assert_eq!(
            parse_size_header(b"          "),
            Err(RelayError::InvalidSizeHeader)
        );
        assert_eq!(
            parse_size_header(b"      -124"),
            Err(RelayError::InvalidSizeHeader)
        );
    }

    #[test]
    fn test_file_header_format() {
        let header = encode_file_header("report.txt", 1024);
        assert_eq!(header.len(), FILE_HEADER_LEN);
        // Left-padded: content sits at the end
        assert!(header.ends_with(b"report.txt|1024"));
        assert!(header.starts_with(b" "));

        let (name, size) = parse_file_header(&header).unwrap();
        assert_eq!(name, "report.txt");
        assert_eq!(size, 1024);
    }

    #[test]
    fn test_file_header_filename_with_pipe() {
        // rsplit keeps everything before the last '|' as the name
        let header = encode_file_header("a|b.txt", 7);
        let (name, size) = parse_file_header(&header).unwrap();
        assert_eq!(name, "a|b.txt");
        assert_eq!(size, 7);
    }

    #[tokio::test]
    async fn test_receive_payload_exact() {
        let data = vec![0xA5u8; 10_000];
        let mut reader = &data[..];
        let payload = receive_payload(&mut reader, 10_000).await.unwrap();
        assert_eq!(payload, data);
    }

    #[tokio::test]
    async fn test_receive_payload_stops_at_declared_size() {
        let data = vec![1u8; 600];
        let mut reader = &data[..];
        let payload = receive_payload(&mut reader, 500).await.unwrap();
        assert_eq!(payload.len(), 500);
    }

    #[tokio::test]
    async fn test_receive_payload_short_stream() {
        let data = vec![1u8; 100];
        let mut reader = &data[..];
        let payload = receive_payload(&mut reader, 1024).await.unwrap();
        assert_eq!(payload.len(), 100);
    }

    #[tokio::test]
    async fn test_run_forwards_complete_transfer() {
        let body = vec![0x42u8; 1024];
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_size_header(1024));
        stream.extend_from_slice(&body);
        let mut reader = &stream[..];

        let (target_tx, mut target_rx) = mpsc::channel(8);
        let (reply_tx, mut reply_rx) = mpsc::channel(8);

        run(
            &mut reader,
            &user("alice"),
            &user("bob"),
            "report.txt",
            target_tx,
            &reply_tx,
        )
        .await
        .unwrap();

        assert_eq!(
            reply_rx.recv().await,
            Some(Frame::Text("[Server]: Ready to receive file size.".to_string()))
        );
        assert_eq!(
            reply_rx.recv().await,
            Some(Frame::Text(
                "[Server]: File 'report.txt' sent successfully to bob.".to_string()
            ))
        );

        assert_eq!(
            target_rx.recv().await,
            Some(Frame::Text("[File]: alice sent you a file: report.txt".to_string()))
        );
        assert_eq!(
            target_rx.recv().await,
            Some(Frame::Binary(encode_file_header("report.txt", 1024)))
        );
        assert_eq!(target_rx.recv().await, Some(Frame::Binary(body)));
    }

    #[tokio::test]
    async fn test_run_discards_short_transfer() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_size_header(1024));
        stream.extend_from_slice(&[0u8; 100]); // then the peer gives up
        let mut reader = &stream[..];

        let (target_tx, mut target_rx) = mpsc::channel(8);
        let (reply_tx, mut reply_rx) = mpsc::channel(8);

        run(
            &mut reader,
            &user("alice"),
            &user("bob"),
            "report.txt",
            target_tx,
            &reply_tx,
        )
        .await
        .unwrap();

        assert_eq!(
            reply_rx.recv().await,
            Some(Frame::Text("[Server]: Ready to receive file size.".to_string()))
        );
        assert_eq!(
            reply_rx.recv().await,
            Some(Frame::Text(
                "[Server]: File transfer incomplete. Expected 1024, got 100 bytes.".to_string()
            ))
        );

        // The receiver never hears about the aborted session
        assert_eq!(target_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_run_rejects_bad_size_header() {
        let mut reader = &b"ten chars!"[..];

        let (target_tx, mut target_rx) = mpsc::channel(8);
        let (reply_tx, mut reply_rx) = mpsc::channel(8);

        run(
            &mut reader,
            &user("alice"),
            &user("bob"),
            "report.txt",
            target_tx,
            &reply_tx,
        )
        .await
        .unwrap();

        let _ready = reply_rx.recv().await;
        assert_eq!(
            reply_rx.recv().await,
            Some(Frame::Text("[Server]: Invalid file size received.".to_string()))
        );
        assert_eq!(target_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_run_reports_missing_size_header() {
        let mut reader = &b"123"[..]; // closed mid-header

        let (target_tx, _target_rx) = mpsc::channel(8);
        let (reply_tx, mut reply_rx) = mpsc::channel(8);

        run(
            &mut reader,
            &user("alice"),
            &user("bob"),
            "report.txt",
            target_tx,
            &reply_tx,
        )
        .await
        .unwrap();

        let _ready = reply_rx.recv().await;
        assert_eq!(
            reply_rx.recv().await,
            Some(Frame::Text("[Server]: Failed to receive file size.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_run_reports_vanished_receiver() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_size_header(4));
        stream.extend_from_slice(b"data");
        let mut reader = &stream[..];

        let (target_tx, target_rx) = mpsc::channel(8);
        drop(target_rx); // receiver disconnected after resolution
        let (reply_tx, mut reply_rx) = mpsc::channel(8);

        run(
            &mut reader,
            &user("alice"),
            &user("bob"),
            "report.txt",
            target_tx,
            &reply_tx,
        )
        .await
        .unwrap();

        let _ready = reply_rx.recv().await;
        assert_eq!(
            reply_rx.recv().await,
            Some(Frame::Text("[Server]: Failed to send file to bob.".to_string()))
        );
    }
}
