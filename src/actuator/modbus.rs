//! Minimal Modbus TCP client for single-coil access
//!
//! Only the two operations the alarm path needs: read coils (0x01) and write
//! single coil (0x05). Every operation is a fresh connect/operate/close
//! cycle against the controller, matching how the PLC expects transient
//! peers; there is no session state to keep consistent across failures.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};

const FN_READ_COILS: u8 = 0x01;
const FN_WRITE_SINGLE_COIL: u8 = 0x05;
const MBAP_HEADER_LEN: usize = 7;

/// Build an MBAP frame around a PDU.
fn encode_frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let length = (pdu.len() + 1) as u16; // unit id + PDU
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes()); // protocol id
    frame.extend_from_slice(&length.to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    frame
}

fn read_coils_pdu(address: u16, count: u16) -> [u8; 5] {
    let a = address.to_be_bytes();
    let c = count.to_be_bytes();
    [FN_READ_COILS, a[0], a[1], c[0], c[1]]
}

fn write_single_coil_pdu(address: u16, value: bool) -> [u8; 5] {
    let a = address.to_be_bytes();
    let v: u16 = if value { 0xFF00 } else { 0x0000 };
    let v = v.to_be_bytes();
    [FN_WRITE_SINGLE_COIL, a[0], a[1], v[0], v[1]]
}

/// Reject exception responses and function-code mismatches.
fn check_response_pdu(request_fn: u8, pdu: &[u8]) -> Result<()> {
    if pdu.is_empty() {
        return Err(Error::Hardware("empty response PDU".to_string()));
    }
    if pdu[0] == (request_fn | 0x80) {
        let code = pdu.get(1).copied().unwrap_or(0);
        return Err(Error::Hardware(format!(
            "modbus exception 0x{code:02X} for function 0x{request_fn:02X}"
        )));
    }
    if pdu[0] != request_fn {
        return Err(Error::Hardware(format!(
            "unexpected function 0x{:02X} in response",
            pdu[0]
        )));
    }
    Ok(())
}

/// ModbusClient instance; one per controller endpoint.
pub struct ModbusClient {
    host: String,
    port: u16,
    unit_id: u8,
    op_timeout: Duration,
    next_transaction: AtomicU16,
}

impl ModbusClient {
    pub fn new(host: String, port: u16, unit_id: u8) -> Self {
        Self {
            host,
            port,
            unit_id,
            op_timeout: Duration::from_secs(2),
            next_transaction: AtomicU16::new(1),
        }
    }

    /// Read one coil.
    pub async fn read_coil(&self, address: u16) -> Result<bool> {
        let pdu = self.transact(&read_coils_pdu(address, 1)).await?;
        check_response_pdu(FN_READ_COILS, &pdu)?;
        // [fn, byte count, bit field]
        let bits = pdu
            .get(2)
            .ok_or_else(|| Error::Hardware("short read-coils response".to_string()))?;
        Ok(bits & 0x01 != 0)
    }

    /// Write one coil. The controller echoes the request on success.
    pub async fn write_coil(&self, address: u16, value: bool) -> Result<()> {
        let request = write_single_coil_pdu(address, value);
        let pdu = self.transact(&request).await?;
        check_response_pdu(FN_WRITE_SINGLE_COIL, &pdu)?;
        if pdu.len() < 5 || pdu[1..5] != request[1..5] {
            return Err(Error::Hardware("write-coil echo mismatch".to_string()));
        }
        Ok(())
    }

    /// Fresh connect, one request/response exchange, close.
    async fn transact(&self, pdu: &[u8]) -> Result<Vec<u8>> {
        let transaction_id = self.next_transaction.fetch_add(1, Ordering::Relaxed);
        let frame = encode_frame(transaction_id, self.unit_id, pdu);
        let addr = format!("{}:{}", self.host, self.port);

        let mut stream = timeout(self.op_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Hardware(format!("connect to {addr} timed out")))?
            .map_err(|e| Error::Hardware(format!("connect to {addr} failed: {e}")))?;

        timeout(self.op_timeout, stream.write_all(&frame))
            .await
            .map_err(|_| Error::Hardware("write timed out".to_string()))?
            .map_err(|e| Error::Hardware(format!("write failed: {e}")))?;

        let mut header = [0u8; MBAP_HEADER_LEN];
        timeout(self.op_timeout, stream.read_exact(&mut header))
            .await
            .map_err(|_| Error::Hardware("response timed out".to_string()))?
            .map_err(|e| Error::Hardware(format!("read failed: {e}")))?;

        let echoed_transaction = u16::from_be_bytes([header[0], header[1]]);
        let protocol = u16::from_be_bytes([header[2], header[3]]);
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        if protocol != 0 {
            return Err(Error::Hardware(format!("unexpected protocol id {protocol}")));
        }
        if echoed_transaction != transaction_id {
            return Err(Error::Hardware("transaction id mismatch".to_string()));
        }
        if length < 2 || length > 256 {
            return Err(Error::Hardware(format!("implausible frame length {length}")));
        }

        let mut response = vec![0u8; length - 1]; // unit id already consumed
        timeout(self.op_timeout, stream.read_exact(&mut response))
            .await
            .map_err(|_| Error::Hardware("response body timed out".to_string()))?
            .map_err(|e| Error::Hardware(format!("read failed: {e}")))?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(0x0102, 0x01, &[0x05, 0x20, 0x04, 0xFF, 0x00]);
        assert_eq!(
            frame,
            vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x20, 0x04, 0xFF, 0x00]
        );
    }

    #[test]
    fn test_write_coil_pdu_values() {
        assert_eq!(write_single_coil_pdu(0x2004, true), [0x05, 0x20, 0x04, 0xFF, 0x00]);
        assert_eq!(write_single_coil_pdu(0x2004, false), [0x05, 0x20, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn test_read_coils_pdu_values() {
        assert_eq!(read_coils_pdu(0x2005, 1), [0x01, 0x20, 0x05, 0x00, 0x01]);
    }

    #[test]
    fn test_exception_response_is_error() {
        let err = check_response_pdu(FN_WRITE_SINGLE_COIL, &[0x85, 0x02]).unwrap_err();
        assert!(matches!(err, Error::Hardware(_)));
        assert!(check_response_pdu(FN_WRITE_SINGLE_COIL, &[0x05, 0, 0, 0, 0]).is_ok());
    }

    /// One-shot mock controller: accepts a single connection, reads one
    /// request frame and answers with a canned PDU under the request's
    /// transaction id.
    async fn mock_controller(respond_pdu: Vec<u8>) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut header = [0u8; MBAP_HEADER_LEN];
            stream.read_exact(&mut header).await.unwrap();
            let len = u16::from_be_bytes([header[4], header[5]]) as usize;
            let mut request = vec![0u8; len - 1];
            stream.read_exact(&mut request).await.unwrap();

            let mut frame = Vec::new();
            frame.extend_from_slice(&header[0..2]); // echo transaction id
            frame.extend_from_slice(&[0, 0]);
            frame.extend_from_slice(&((respond_pdu.len() + 1) as u16).to_be_bytes());
            frame.push(header[6]);
            frame.extend_from_slice(&respond_pdu);
            stream.write_all(&frame).await.unwrap();
            request
        });

        (port, handle)
    }

    #[tokio::test]
    async fn test_write_coil_round_trip() {
        let (port, server) = mock_controller(vec![0x05, 0x20, 0x04, 0xFF, 0x00]).await;
        let client = ModbusClient::new("127.0.0.1".to_string(), port, 1);
        client.write_coil(0x2004, true).await.unwrap();
        let request = server.await.unwrap();
        assert_eq!(request, vec![0x05, 0x20, 0x04, 0xFF, 0x00]);
    }

    #[tokio::test]
    async fn test_read_coil_round_trip() {
        let (port, _server) = mock_controller(vec![0x01, 0x01, 0x01]).await;
        let client = ModbusClient::new("127.0.0.1".to_string(), port, 1);
        assert!(client.read_coil(0x2005).await.unwrap());
    }

    #[tokio::test]
    async fn test_exception_reply_surfaces_as_hardware_error() {
        let (port, _server) = mock_controller(vec![0x85, 0x04]).await;
        let client = ModbusClient::new("127.0.0.1".to_string(), port, 1);
        let err = client.write_coil(0x2004, true).await.unwrap_err();
        assert!(matches!(err, Error::Hardware(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_hardware_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ModbusClient::new("127.0.0.1".to_string(), port, 1);
        let err = client.read_coil(1).await.unwrap_err();
        assert!(matches!(err, Error::Hardware(_)));
    }
}
