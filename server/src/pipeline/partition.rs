use crate::error::PipelineError;
use crate::model::Record;

/// A contiguous slice of the filtered input, submitted in one external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 0-based submission index
    pub index: usize,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn titles(&self) -> Vec<String> {
        self.records.iter().map(|r| r.title.clone()).collect()
    }
}

/// Split `records` into order-preserving batches of `batch_size`; only the
/// last batch may be shorter.
pub fn partition(records: Vec<Record>, batch_size: usize) -> Result<Vec<Batch>, PipelineError> {
    if batch_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "Batch size must be greater than 0".to_string(),
        ));
    }

    let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size));
    let mut remaining = records.into_iter().peekable();
    while remaining.peek().is_some() {
        let records: Vec<Record> = remaining.by_ref().take(batch_size).collect();
        batches.push(Batch {
            index: batches.len(),
            records,
        });
    }

    Ok(batches)
}
