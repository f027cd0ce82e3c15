//! Opaque pagination cursors for `list_libraries`/`list_chunks` (§4.8).
//! Not specified by spec.md itself; the obvious resolution is a cursor
//! that is just a big-endian-encoded offset into a stable, creation-order
//! sequence, round-tripped verbatim by the caller. Encoded as hex rather
//! than base64 since nothing else in this workspace pulls in a base64
//! crate and a fixed-width hex string is just as opaque to callers.

pub fn encode_cursor(offset: u64) -> String {
    format!("{offset:016x}")
}

pub fn decode_cursor(cursor: &str) -> Option<u64> {
    u64::from_str_radix(cursor, 16).ok()
}

/// A page of items plus the cursor to pass back for the next page, or
/// `None` once the sequence is exhausted.
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

pub fn paginate<T: Clone>(all: &[T], cursor: Option<&str>, limit: usize) -> Page<T> {
    let start = cursor.and_then(decode_cursor).unwrap_or(0) as usize;
    if start >= all.len() || limit == 0 {
        return Page {
            items: Vec::new(),
            next_cursor: None,
        };
    }
    let end = (start + limit).min(all.len());
    let items = all[start..end].to_vec();
    let next_cursor = if end < all.len() {
        Some(encode_cursor(end as u64))
    } else {
        None
    };
    Page { items, next_cursor }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginates_forward_through_all_items() {
        let all: Vec<u32> = (0..25).collect();
        let mut cursor = None;
        let mut seen = Vec::new();
        loop {
            let page = paginate(&all, cursor.as_deref(), 10);
            seen.extend(page.items);
            if page.next_cursor.is_none() {
                break;
            }
            cursor = page.next_cursor;
        }
        assert_eq!(seen, all);
    }

    #[test]
    fn empty_cursor_starts_at_zero() {
        let all = vec![1, 2, 3];
        let page = paginate(&all, None, 2);
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.next_cursor.is_some());
    }

    #[test]
    fn past_the_end_yields_empty_page() {
        let all = vec![1, 2, 3];
        let cursor = encode_cursor(10);
        let page = paginate(&all, Some(&cursor), 2);
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
