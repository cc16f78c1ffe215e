use tokio::sync::mpsc;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{DataSet, Row};

pub type RowSender = mpsc::Sender<Row>;
pub type RowReceiver = mpsc::Receiver<Row>;

/// A [`DataSet`] together with the receiving end of the rows conforming to it.
///
/// The producing stage keeps the matching [`RowSender`]; the channel closes once that sender
/// is dropped. A bundle is moved into exactly one consumer.
#[derive(Debug)]
pub struct Bundle {
    pub data_set: DataSet,
    pub rows: RowReceiver,
}

impl Bundle {
    /// Creates a bundle whose channel buffers up to `capacity` rows.
    ///
    /// Fails with [`ErrorKind::ConfigError`] if `capacity` is zero.
    pub fn channel(data_set: DataSet, capacity: usize) -> EtlResult<(RowSender, Bundle)> {
        if capacity == 0 {
            bail!(
                ErrorKind::ConfigError,
                "Row channel capacity must be greater than zero",
                data_set.name()
            );
        }

        let (tx, rows) = mpsc::channel(capacity);
        Ok((tx, Bundle { data_set, rows }))
    }

    /// Replaces the data set, keeping the same row receiver.
    pub fn with_data_set(self, data_set: DataSet) -> Bundle {
        Bundle {
            data_set,
            rows: self.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, DataType, TableName};

    fn data_set() -> DataSet {
        DataSet::new(
            TableName::new("public", "cpu"),
            vec![Column::new("time", DataType::TimestampTz)],
            "time",
        )
        .unwrap()
    }

    #[test]
    fn zero_capacity_is_a_config_error() {
        let err = Bundle::channel(data_set(), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn channel_closes_when_sender_is_dropped() {
        let (tx, mut bundle) = Bundle::channel(data_set(), 1).unwrap();
        drop(tx);
        assert!(bundle.rows.recv().await.is_none());
    }
}
