//! Attach a un job: conexión HTTP secuestrada con tramas binarias.
//!
//! Tras `POST /attach` con respuesta 200, el host escribe un byte de estado
//! (`success`, `waiting`, `error`). Después ambos lados intercambian tramas:
//!
//! ```text
//! data:   [3][stream u8][len u32 BE][bytes]   stream 0=stdin 1=stdout 2=stderr
//! signal: [4][sig u32 BE]
//! exit:   [5][status u32 BE]
//! resize: [6][height u16 BE][width u16 BE]
//! ```
//! Una trama `data` vacía cierra el stream correspondiente.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::error::{AdapterError, Result};

const STATE_SUCCESS: u8 = 0;
const STATE_WAITING: u8 = 1;
const STATE_ERROR: u8 = 2;
const FRAME_DATA: u8 = 3;
const FRAME_SIGNAL: u8 = 4;
const FRAME_EXIT: u8 = 5;
const FRAME_RESIZE: u8 = 6;

pub const FLAG_STDOUT: u8 = 1;
pub const FLAG_STDERR: u8 = 1 << 1;
pub const FLAG_STDIN: u8 = 1 << 2;
pub const FLAG_LOGS: u8 = 1 << 3;
pub const FLAG_STREAM: u8 = 1 << 4;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachRequest {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub flags: u8,
    #[serde(default, skip_serializing_if = "is_zero16")]
    pub height: u16,
    #[serde(default, skip_serializing_if = "is_zero16")]
    pub width: u16,
}

fn is_zero(v: &u8) -> bool { *v == 0 }

fn is_zero16(v: &u16) -> bool { *v == 0 }

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachFrame {
    Data { stream: u8, data: Bytes },
    Signal(u32),
    Exit(u32),
    Resize { height: u16, width: u16 },
}

#[derive(Debug, Default)]
pub struct AttachCodec;

impl Decoder for AttachCodec {
    type Item = AttachFrame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<AttachFrame>> {
        let Some(&kind) = src.first() else {
            return Ok(None);
        };
        let needed = match kind {
            FRAME_DATA => {
                if src.len() < 6 {
                    return Ok(None);
                }
                let len = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;
                6 + len
            }
            FRAME_SIGNAL | FRAME_EXIT | FRAME_RESIZE => 5,
            other => {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unknown attach frame {other}")));
            }
        };
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(needed);
        frame.advance(1);
        let item = match kind {
            FRAME_DATA => {
                let stream = frame.get_u8();
                frame.advance(4);
                AttachFrame::Data { stream,
                                    data: frame.freeze() }
            }
            FRAME_SIGNAL => AttachFrame::Signal(frame.get_u32()),
            FRAME_EXIT => AttachFrame::Exit(frame.get_u32()),
            _ => AttachFrame::Resize { height: frame.get_u16(),
                                       width: frame.get_u16() },
        };
        Ok(Some(item))
    }
}

impl Encoder<AttachFrame> for AttachCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: AttachFrame, dst: &mut BytesMut) -> std::io::Result<()> {
        match item {
            AttachFrame::Data { stream, data } => {
                dst.reserve(6 + data.len());
                dst.put_u8(FRAME_DATA);
                dst.put_u8(stream);
                dst.put_u32(data.len() as u32);
                dst.extend_from_slice(&data);
            }
            AttachFrame::Signal(sig) => {
                dst.put_u8(FRAME_SIGNAL);
                dst.put_u32(sig);
            }
            AttachFrame::Exit(status) => {
                dst.put_u8(FRAME_EXIT);
                dst.put_u32(status);
            }
            AttachFrame::Resize { height, width } => {
                dst.put_u8(FRAME_RESIZE);
                dst.put_u16(height);
                dst.put_u16(width);
            }
        }
        Ok(())
    }
}

pub struct AttachClient {
    framed: Framed<BufReader<TcpStream>, AttachCodec>,
    waiting: bool,
}

impl AttachClient {
    /// Abre el attach contra `addr` (`host:port`). Si el job todavía no
    /// arrancó y `wait` es falso, falla con `Attach("would wait")`.
    pub async fn connect(addr: &str, req: &AttachRequest, wait: bool) -> Result<Self> {
        let body = serde_json::to_vec(req)?;
        let mut conn = BufReader::new(TcpStream::connect(addr).await?);
        let head = format!("POST /attach HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
                           body.len());
        conn.get_mut().write_all(head.as_bytes()).await?;
        conn.get_mut().write_all(&body).await?;

        let mut status_line = String::new();
        conn.read_line(&mut status_line).await?;
        let status = status_line.split_whitespace().nth(1).unwrap_or_default().to_string();
        loop {
            let mut line = String::new();
            if conn.read_line(&mut line).await? == 0 || line == "\r\n" || line == "\n" {
                break;
            }
        }
        if status != "200" {
            return Err(AdapterError::Attach(format!("unexpected status {status}")));
        }

        let state = conn.read_u8().await?;
        let waiting = match state {
            STATE_WAITING if !wait => return Err(AdapterError::Attach("would wait".into())),
            STATE_WAITING => true,
            other => {
                handle_state(other, &mut conn).await?;
                false
            }
        };
        debug!("attach:connected job={} waiting={waiting}", req.job_id);
        Ok(Self { framed: Framed::new(conn, AttachCodec),
                  waiting })
    }

    /// Espera a que el host confirme el arranque del job.
    pub async fn wait(&mut self) -> Result<()> {
        if !self.waiting {
            return Ok(());
        }
        // Aún no se leyó ninguna trama: el buffer del codec está vacío.
        let conn = self.framed.get_mut();
        let state = conn.read_u8().await?;
        handle_state(state, conn).await?;
        self.waiting = false;
        Ok(())
    }

    /// Copia stdout/stderr a los writers hasta la trama `exit` y devuelve
    /// el código de salida.
    pub async fn receive<O, E>(&mut self, stdout: &mut O, stderr: &mut E) -> Result<i32>
        where O: AsyncWrite + Unpin,
              E: AsyncWrite + Unpin
    {
        self.wait().await?;
        while let Some(frame) = self.framed.next().await {
            match frame? {
                AttachFrame::Data { stream: 1, data } => stdout.write_all(&data).await?,
                AttachFrame::Data { stream: 2, data } => stderr.write_all(&data).await?,
                AttachFrame::Data { stream, .. } => return Err(AdapterError::Attach(format!("unknown stream {stream}"))),
                AttachFrame::Exit(status) => return Ok(status as i32),
                AttachFrame::Signal(_) | AttachFrame::Resize { .. } => {}
            }
        }
        Err(AdapterError::Attach("connection closed before exit".into()))
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.send(AttachFrame::Data { stream: 0,
                                      data: Bytes::copy_from_slice(data) })
            .await
    }

    /// Cierra stdin del job.
    pub async fn close_write(&mut self) -> Result<()> {
        self.send(AttachFrame::Data { stream: 0,
                                      data: Bytes::new() })
            .await
    }

    pub async fn signal(&mut self, sig: u32) -> Result<()> { self.send(AttachFrame::Signal(sig)).await }

    pub async fn resize_tty(&mut self, height: u16, width: u16) -> Result<()> {
        self.send(AttachFrame::Resize { height, width }).await
    }

    async fn send(&mut self, frame: AttachFrame) -> Result<()> {
        self.framed.send(frame).await?;
        Ok(())
    }
}

async fn handle_state(state: u8, conn: &mut BufReader<TcpStream>) -> Result<()> {
    match state {
        STATE_SUCCESS => Ok(()),
        STATE_ERROR => {
            let mut rest = Vec::new();
            conn.read_to_end(&mut rest).await?;
            let msg = rest.get(4..).unwrap_or_default();
            Err(AdapterError::Attach(String::from_utf8_lossy(msg).into_owned()))
        }
        other => Err(AdapterError::Attach(format!("unknown attach state {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_waits_for_complete_frame() {
        let mut codec = AttachCodec;
        let mut buf = BytesMut::from(&[FRAME_DATA, 1, 0, 0, 0, 3, b'a'][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"bc");
        buf.extend_from_slice(&[FRAME_EXIT, 0, 0, 0, 7]);
        assert_eq!(codec.decode(&mut buf).unwrap(),
                   Some(AttachFrame::Data { stream: 1,
                                            data: Bytes::from_static(b"abc") }));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(AttachFrame::Exit(7)));
        assert!(buf.is_empty());
    }

    #[test]
    fn encoder_writes_big_endian_headers() {
        let mut codec = AttachCodec;
        let mut buf = BytesMut::new();
        codec.encode(AttachFrame::Resize { height: 24, width: 80 }, &mut buf).unwrap();
        codec.encode(AttachFrame::Data { stream: 0,
                                         data: Bytes::from_static(b"hi") },
                     &mut buf)
             .unwrap();
        assert_eq!(&buf[..], &[FRAME_RESIZE, 0, 24, 0, 80, FRAME_DATA, 0, 0, 0, 0, 2, b'h', b'i'][..]);
    }

    #[test]
    fn unknown_frame_is_an_error() {
        let mut buf = BytesMut::from(&[9u8, 0, 0][..]);
        assert!(AttachCodec.decode(&mut buf).is_err());
    }

    #[test]
    fn request_omits_empty_fields() {
        let req = AttachRequest { job_id: "h1-x".into(),
                                  ..AttachRequest::default() };
        assert_eq!(serde_json::to_string(&req).unwrap(), r#"{"job_id":"h1-x"}"#);
    }
}
