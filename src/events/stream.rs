use futures::stream::{self, Stream};
use std::io::BufRead;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Turns one line into an event, or None to skip it.
pub type LineParser<T> = fn(&str) -> Option<T>;

/// Blocking event iterator over a line-oriented reader.
///
/// Ends when the reader hits EOF or a read error. Non UTF-8 lines and lines the
/// parser rejects are skipped. Owns its reader, so it can be consumed only once.
pub struct EventStream<R, T> {
    lines: std::io::Lines<R>,
    parse: LineParser<T>,
}

impl<R: BufRead, T> EventStream<R, T> {
    pub fn new(reader: R, parse: LineParser<T>) -> Self {
        Self {
            lines: reader.lines(),
            parse,
        }
    }
}

impl<R: BufRead, T> Iterator for EventStream<R, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::debug!("Skipping non UTF-8 line: {}", e);
                    continue;
                }
                Err(e) => {
                    tracing::debug!("Event stream closed: {}", e);
                    return None;
                }
            };
            if let Some(event) = (self.parse)(&line) {
                return Some(event);
            }
        }
    }
}

/// Async counterpart of [`EventStream`] for child process pipes.
pub fn event_stream<R, T>(reader: R, parse: LineParser<T>) -> impl Stream<Item = T>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold(reader.lines(), move |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = parse(&line) {
                        return Some((event, lines));
                    }
                }
                Ok(None) => return None,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::debug!("Skipping non UTF-8 line: {}", e);
                }
                Err(e) => {
                    tracing::debug!("Event stream closed: {}", e);
                    return None;
                }
            }
        }
    })
}
