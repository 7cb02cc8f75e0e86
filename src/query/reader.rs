//! Streaming query reader
//!
//! Reads one query container per line from stdin or a file. The first line
//! that parses decides the format for the whole stream: JSON if it parses as
//! JSON, colon format otherwise. Registered filters drop containers,
//! registered maps transform the survivors in registration order.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::error::Result;

use super::request::QueryContainer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineFormat {
    Json,
    Colon,
}

type MapFn = Box<dyn FnMut(QueryContainer) -> QueryContainer>;
type FilterFn = Box<dyn FnMut(&QueryContainer) -> bool>;

/// Line-oriented reader yielding query containers
pub struct QueryReader {
    input: Box<dyn BufRead>,
    format: Option<LineFormat>,
    maps: Vec<MapFn>,
    filters: Vec<FilterFn>,
    done: bool,
}

impl QueryReader {
    /// Read from a file; I/O errors surface immediately
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    /// Read from standard input
    pub fn from_stdin() -> Self {
        Self::from_reader(BufReader::new(io::stdin()))
    }

    pub fn from_reader(reader: impl BufRead + 'static) -> Self {
        Self {
            input: Box::new(reader),
            format: None,
            maps: Vec::new(),
            filters: Vec::new(),
            done: false,
        }
    }

    /// Transform every yielded container; maps apply in registration order
    #[must_use]
    pub fn map(mut self, map: impl FnMut(QueryContainer) -> QueryContainer + 'static) -> Self {
        self.maps.push(Box::new(map));
        self
    }

    /// Drop containers any filter rejects
    #[must_use]
    pub fn filter(mut self, filter: impl FnMut(&QueryContainer) -> bool + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    fn next_container(&mut self) -> Option<Result<QueryContainer>> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(err) => return Some(Err(err.into())),
        }
        let line = line.trim_end_matches(['\n', '\r']);
        match self.format {
            Some(LineFormat::Json) => Some(QueryContainer::from_json(line)),
            Some(LineFormat::Colon) => Some(Ok(QueryContainer::from_colon_format(line))),
            None => match QueryContainer::from_json(line) {
                Ok(container) => {
                    self.format = Some(LineFormat::Json);
                    Some(Ok(container))
                }
                Err(_) => {
                    self.format = Some(LineFormat::Colon);
                    Some(Ok(QueryContainer::from_colon_format(line)))
                }
            },
        }
    }
}

impl Iterator for QueryReader {
    type Item = Result<QueryContainer>;

    /// The next surviving container, or the first error; iteration stops
    /// after an error
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let container = match self.next_container()? {
                Ok(container) => container,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            if self.filters.iter_mut().any(|accept| !accept(&container)) {
                continue;
            }
            let container = self
                .maps
                .iter_mut()
                .fold(container, |container, transform| transform(container));
            return Some(Ok(container));
        }
    }
}
