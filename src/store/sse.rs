//! Incremental decoder for `text/event-stream` bodies.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
  /// Event name; `message` when the server omitted it.
  pub event: String,
  pub data: String,
  pub id: Option<String>,
}

/// Buffers raw body chunks and yields complete frames.
#[derive(Debug, Default)]
pub struct SseDecoder {
  buf: Vec<u8>,
  event: Option<String>,
  data: Vec<String>,
  id: Option<String>,
}

impl SseDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Feed a chunk, returning every frame it completed.
  pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
    self.buf.extend_from_slice(chunk);

    let mut frames = Vec::new();
    // Split on raw bytes so multi-byte characters cut by a chunk boundary survive.
    while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
      let raw: Vec<u8> = self.buf.drain(..=pos).collect();
      let line = String::from_utf8_lossy(&raw);
      let line = line.trim_end_matches(['\n', '\r']);
      if let Some(frame) = self.line(line) {
        frames.push(frame);
      }
    }
    frames
  }

  fn line(&mut self, line: &str) -> Option<SseFrame> {
    if line.is_empty() {
      return self.dispatch();
    }
    if line.starts_with(':') {
      return None;
    }

    let (field, value) = match line.split_once(':') {
      Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
      None => (line, ""),
    };

    match field {
      "event" => self.event = Some(value.to_string()),
      "data" => self.data.push(value.to_string()),
      "id" => self.id = Some(value.to_string()),
      _ => {}
    }
    None
  }

  fn dispatch(&mut self) -> Option<SseFrame> {
    let event = self.event.take();
    let id = self.id.take();
    if self.data.is_empty() {
      return None;
    }
    let data = std::mem::take(&mut self.data).join("\n");
    Some(SseFrame {
      event: event.unwrap_or_else(|| "message".to_string()),
      data,
      id,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_single_frame() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.push(b"id:abc\nevent:PB_CONNECT\ndata:{\"clientId\":\"abc\"}\n\n");
    assert_eq!(
      frames,
      vec![SseFrame {
        event: "PB_CONNECT".into(),
        data: r#"{"clientId":"abc"}"#.into(),
        id: Some("abc".into()),
      }]
    );
  }

  #[test]
  fn test_frame_split_across_chunks() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"event: answers/*\nda").is_empty());
    assert!(decoder.push(b"ta: {\"action\":\"update\"}\r\n").is_empty());
    let frames = decoder.push(b"\r\n");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, "answers/*");
    assert_eq!(frames[0].data, r#"{"action":"update"}"#);
  }

  #[test]
  fn test_multiline_data_and_comments() {
    let mut decoder = SseDecoder::new();
    let frames = decoder.push(b": keepalive\ndata: one\ndata: two\n\n");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, "message");
    assert_eq!(frames[0].data, "one\ntwo");
  }

  #[test]
  fn test_blank_line_without_data_is_ignored() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"event: ping\n\n").is_empty());
    let frames = decoder.push(b"data: x\n\n");
    assert_eq!(frames[0].event, "message");
  }

  #[test]
  fn test_utf8_split_inside_character() {
    let mut decoder = SseDecoder::new();
    let payload = "data: Уголовное право\n\n".as_bytes();
    // Cut inside the two-byte encoding of the first Cyrillic letter.
    assert!(decoder.push(&payload[..7]).is_empty());
    let frames = decoder.push(&payload[7..]);
    assert_eq!(frames[0].data, "Уголовное право");
  }
}
