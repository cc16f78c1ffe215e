use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, DataSet};

/// Values of one record, aligned with the columns of its [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Cell>,
}

impl Row {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fails with [`ErrorKind::ConversionError`] unless the row has one value per column.
    pub fn check_arity(&self, data_set: &DataSet) -> EtlResult<()> {
        let expected = data_set.columns().len();
        if self.values.len() != expected {
            bail!(
                ErrorKind::ConversionError,
                "Row does not match the data set",
                format!(
                    "{} has {expected} columns, row has {} values",
                    data_set.name(),
                    self.values.len()
                )
            );
        }

        Ok(())
    }
}

impl From<Vec<Cell>> for Row {
    fn from(values: Vec<Cell>) -> Self {
        Row::new(values)
    }
}
