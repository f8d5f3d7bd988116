use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::debug;

use crate::error::TransportError;

/// エンコード済みパケットの送り先
pub trait PacketSink {
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError>;
}

/// UDP送信（非ブロッキング、再送なし）
pub struct UdpSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSender {
    pub fn new(target_addr: &str) -> Result<Self, TransportError> {
        let target = target_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::Resolve(target_addr.to_string()))?;
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        debug!("UDP sender {} -> {}", socket.local_addr()?, target);
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl PacketSink for UdpSender {
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        self.socket.send_to(packet, self.target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_send_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = receiver.local_addr().unwrap().to_string();

        let mut sender = UdpSender::new(&addr).unwrap();
        assert_eq!(sender.target(), receiver.local_addr().unwrap());
        sender.send(b"hello").unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn test_invalid_address() {
        assert!(UdpSender::new("not an address").is_err());
    }
}
