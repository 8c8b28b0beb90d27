//! Downstream delivery of emitted records.

use crate::context::Record;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Receives every emitted record, tagged with the logical name of its resource type.
pub trait Sink {
    fn emit(&mut self, stream: &str, record: &Record) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename = "RECORD")]
struct RecordMessage<'a> {
    stream: &'a str,
    record: &'a Record,
}

/// Writes Singer `RECORD` messages, one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    out: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn emit(&mut self, stream: &str, record: &Record) -> Result<()> {
        serde_json::to_writer(&mut self.out, &RecordMessage { stream, record })
            .map_err(std::io::Error::from)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub records: Vec<(String, Record)>,
}

impl CollectingSink {
    /// Records emitted for one stream, in order.
    pub fn stream(&self, name: &str) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|(stream, _)| stream == name)
            .map(|(_, record)| record)
            .collect()
    }
}

impl Sink for CollectingSink {
    fn emit(&mut self, stream: &str, record: &Record) -> Result<()> {
        self.records.push((stream.to_string(), record.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn singer_record_lines() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let a = json!({"item_id": "v1"}).as_object().cloned().unwrap();
        let b = json!({"comment_id": "c1"}).as_object().cloned().unwrap();
        sink.emit("videos", &a).unwrap();
        sink.emit("comments", &b).unwrap();
        assert_eq!(sink.written(), 2);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(
            lines,
            vec![
                json!({"type": "RECORD", "stream": "videos", "record": {"item_id": "v1"}}),
                json!({"type": "RECORD", "stream": "comments", "record": {"comment_id": "c1"}}),
            ]
        );
    }

    #[test]
    fn collecting_sink_filters_by_stream() {
        let mut sink = CollectingSink::default();
        let r = json!({"x": 1}).as_object().cloned().unwrap();
        sink.emit("accounts", &r).unwrap();
        sink.emit("videos", &r).unwrap();
        sink.emit("accounts", &r).unwrap();
        assert_eq!(sink.stream("accounts").len(), 2);
        assert_eq!(sink.stream("videos").len(), 1);
        assert!(sink.stream("comments").is_empty());
    }
}
