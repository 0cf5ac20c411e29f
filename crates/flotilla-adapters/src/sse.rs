//! Parser incremental de `text/event-stream`.
//!
//! Los trozos llegan con cortes arbitrarios (incluso dentro de un carácter
//! UTF-8), así que se acumulan bytes y sólo se decodifican líneas completas.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self { Self::default() }

    /// Añade bytes y devuelve los eventos completados (terminados en línea
    /// vacía).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if let Some(ev) = self.dispatch() {
                    out.push(ev);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                None => (line, ""),
            };
            match field {
                "data" => self.data.push(value.to_string()),
                "id" => self.id = Some(value.to_string()),
                "event" => self.event = Some(value.to_string()),
                _ => {}
            }
        }
        out
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseEvent { id: self.id.clone(),
                        event: self.event.take(),
                        data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_split_across_chunks() {
        let mut p = SseParser::new();
        assert!(p.push(b"id: 7\nda").is_empty());
        let evs = p.push(b"ta: {\"a\":1}\n\ndata: x\n");
        assert_eq!(evs, vec![SseEvent { id: Some("7".into()),
                                        event: None,
                                        data: "{\"a\":1}".into() }]);
        let evs = p.push(b"\n");
        assert_eq!(evs[0].data, "x");
        assert_eq!(evs[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn comments_and_crlf_are_handled() {
        let mut p = SseParser::new();
        let evs = p.push(b": keepalive\r\nevent: up\r\ndata: a\r\ndata: b\r\n\r\n");
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].event.as_deref(), Some("up"));
        assert_eq!(evs[0].data, "a\nb");
    }

    #[test]
    fn multibyte_char_split_between_chunks() {
        let mut p = SseParser::new();
        let text = "data: año\n\n".as_bytes();
        let cut = text.iter().position(|b| *b >= 0x80).unwrap() + 1;
        assert!(p.push(&text[..cut]).is_empty());
        let evs = p.push(&text[cut..]);
        assert_eq!(evs[0].data, "año");
    }
}
