//! Chunking contacts into output files and output files into delivery batches.
//!
//! Both splits keep input order; only the last chunk or batch may be short.

use crate::{errors::Error, Result};

/// Telegram accepts at most 10 documents per media group.
pub const DEFAULT_MAX_PER_BATCH: usize = 10;

/// Split contacts into order-preserving chunks; the last one may be shorter.
pub fn chunk_contacts<T: Clone>(items: &[T], chunk_size: usize) -> Result<Vec<Vec<T>>> {
    if chunk_size == 0 {
        return Err(Error::Validation(
            "Contacts per file must be at least 1.".to_string(),
        ));
    }
    Ok(items.chunks(chunk_size).map(<[T]>::to_vec).collect())
}

/// Group files into delivery batches of at most `max_per_batch`, keeping order.
///
/// A `max_per_batch` of zero is treated as one file per batch.
pub fn plan_delivery_batches<F>(files: Vec<F>, max_per_batch: usize) -> Vec<Vec<F>> {
    let max = max_per_batch.max(1);
    let mut out: Vec<Vec<F>> = Vec::with_capacity(files.len().div_ceil(max));
    let mut current: Vec<F> = Vec::with_capacity(max.min(files.len()));

    for f in files {
        current.push(f);
        if current.len() == max {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::Contact;

    fn contacts(n: usize) -> Vec<Contact> {
        (1..=n)
            .map(|i| Contact::new(format!("c{i}"), &i.to_string()).unwrap())
            .collect()
    }

    #[test]
    fn chunks_25_by_10() {
        let cs = contacts(25);
        let chunks = chunk_contacts(&cs, 10).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        let flat: Vec<Contact> = chunks.into_iter().flatten().collect();
        assert_eq!(flat, cs);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            chunk_contacts(&contacts(3), 0),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn small_file_counts_form_one_batch() {
        let batches = plan_delivery_batches((1..=7).collect::<Vec<_>>(), 10);
        assert_eq!(batches, vec![vec![1, 2, 3, 4, 5, 6, 7]]);
    }

    #[test]
    fn large_file_counts_are_split() {
        let batches = plan_delivery_batches((1..=23).collect::<Vec<_>>(), DEFAULT_MAX_PER_BATCH);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        assert_eq!(batches[2], vec![21, 22, 23]);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let batches = plan_delivery_batches((1..=20).collect::<Vec<_>>(), 10);
        assert_eq!(batches.len(), 2);
        assert!(plan_delivery_batches(Vec::<u8>::new(), 10).is_empty());
    }
}
