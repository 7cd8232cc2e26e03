//! Transaction record ingestion from CSV files.
//!
//! Parsing runs on a reader thread and hands records to the graph builder
//! over a bounded channel, so the builder sees them in file order.

use crate::error::LoadError;
use crate::graph::{GraphBuilder, TransactionGraph};
use crossbeam_channel::bounded;
use csv::{Reader, Writer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::thread;
use tracing::info;

const CHANNEL_CAPACITY: usize = 1024;

/// One row of the transaction feed. Blank cells deserialize as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub timestamp: Option<i64>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub amount: Option<f64>,
    pub device_id: Option<String>,
    pub ip: Option<String>,
    pub instrument_id: Option<String>,
}

impl TransactionRecord {
    pub fn new(timestamp: i64, sender: &str, receiver: &str, amount: f64) -> Self {
        Self {
            timestamp: Some(timestamp),
            sender: Some(sender.to_string()),
            receiver: Some(receiver.to_string()),
            amount: Some(amount),
            ..Default::default()
        }
    }
}

pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<TransactionRecord>, LoadError> {
    let mut reader = Reader::from_path(path)?;
    let records = reader
        .deserialize()
        .collect::<Result<Vec<TransactionRecord>, csv::Error>>()?;
    Ok(records)
}

pub fn write_records(
    path: impl AsRef<Path>,
    records: &[TransactionRecord],
) -> Result<(), LoadError> {
    let mut writer = Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Stream a CSV file straight into a graph.
pub fn load_graph(
    path: impl AsRef<Path>,
    include_id_links: bool,
) -> Result<TransactionGraph, LoadError> {
    let mut reader = Reader::from_path(path.as_ref())?;
    let (tx, rx) = bounded::<Result<TransactionRecord, csv::Error>>(CHANNEL_CAPACITY);

    thread::scope(|scope| {
        let producer = scope.spawn(move || {
            for record in reader.deserialize() {
                if tx.send(record).is_err() {
                    // Builder stopped early on a bad record.
                    break;
                }
            }
        });

        let mut builder = GraphBuilder::new(include_id_links);
        let built = rx.iter().try_for_each(|record| {
            builder.push(&record?)?;
            Ok::<(), LoadError>(())
        });
        drop(rx);
        producer.join().map_err(|_| LoadError::ReaderPanicked)?;
        built?;

        let graph = builder.finish();
        info!(
            path = %path.as_ref().display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "loaded transaction graph"
        );
        Ok(graph)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InputError;
    use crate::graph::NodeId;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_records_with_blank_optionals() {
        let file = csv_file(
            "timestamp,sender,receiver,amount,device_id,ip,instrument_id\n\
             1,a1,a2,10.5,d1,,\n\
             2,a2,a3,7,,10.0.0.1,card3\n",
        );
        let records = read_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].device_id.as_deref(), Some("d1"));
        assert_eq!(records[0].ip, None);
        assert_eq!(records[1].amount, Some(7.0));
        assert_eq!(records[1].instrument_id.as_deref(), Some("card3"));
    }

    #[test]
    fn test_read_records_without_optional_columns() {
        let file = csv_file("timestamp,sender,receiver,amount\n5,x,y,1.25\n");
        let records = read_records(file.path()).unwrap();
        assert_eq!(records, vec![TransactionRecord::new(5, "x", "y", 1.25)]);
    }

    #[test]
    fn test_load_graph_preserves_file_order() {
        let file = csv_file(
            "timestamp,sender,receiver,amount,device_id,ip,instrument_id\n\
             1,c,b,1,,,\n\
             2,a,c,1,d1,,\n",
        );
        let graph = load_graph(file.path(), true).unwrap();
        let order: Vec<String> = graph.nodes().map(|n| graph.id(n).to_string()).collect();
        assert_eq!(order, vec!["account:c", "account:b", "account:a", "device:d1"]);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_load_graph_reports_missing_amount() {
        let file = csv_file(
            "timestamp,sender,receiver,amount\n\
             1,a,b,3\n\
             2,b,c,\n",
        );
        let err = load_graph(file.path(), true).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Input(InputError::MissingField {
                row: 2,
                field: "amount"
            })
        ));
    }

    #[test]
    fn test_write_then_load() {
        let file = NamedTempFile::new().unwrap();
        let mut record = TransactionRecord::new(9, "s", "r", 3.5);
        record.ip = Some("10.1.1.1".to_string());
        write_records(file.path(), &[record]).unwrap();

        let graph = load_graph(file.path(), true).unwrap();
        assert!(graph.node_index(&NodeId::ip("10.1.1.1")).is_some());
        assert_eq!(graph.edge_count(), 3);
    }
}
