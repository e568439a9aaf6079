//! Chunked token diff built around the longest common run.
//!
//! Not minimal, but stable and readable: the longest run of tokens shared
//! by both sides is kept verbatim and the parts before and after it are
//! diffed recursively. Worst case is `O(n·m)` per level.

/// One piece of a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffChunk<T> {
    /// Token present on both sides.
    Same(T),
    /// Tokens replaced; either side may be empty.
    Changed { deleted: Vec<T>, inserted: Vec<T> },
}

/// Position and length of the longest common contiguous run.
fn longest_common_run<T: PartialEq>(old: &[T], new: &[T]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; new.len() + 1];
    let mut curr = vec![0usize; new.len() + 1];
    for (i, o) in old.iter().enumerate() {
        for (j, n) in new.iter().enumerate() {
            curr[j + 1] = if o == n { prev[j] + 1 } else { 0 };
            let len = curr[j + 1];
            // strictly longer only: the earliest run wins ties
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}

pub fn diff<T: PartialEq + Clone>(old: &[T], new: &[T]) -> Vec<DiffChunk<T>> {
    let mut chunks = Vec::new();
    diff_into(old, new, &mut chunks);
    chunks
}

fn diff_into<T: PartialEq + Clone>(old: &[T], new: &[T], out: &mut Vec<DiffChunk<T>>) {
    if old.is_empty() && new.is_empty() {
        return;
    }
    let (old_start, new_start, len) = longest_common_run(old, new);
    if len == 0 {
        out.push(DiffChunk::Changed {
            deleted: old.to_vec(),
            inserted: new.to_vec(),
        });
        return;
    }
    diff_into(&old[..old_start], &new[..new_start], out);
    out.extend(old[old_start..old_start + len].iter().cloned().map(DiffChunk::Same));
    diff_into(&old[old_start + len..], &new[new_start + len..], out);
}

/// Diff two texts split on whitespace.
pub fn diff_words(old: &str, new: &str) -> Vec<DiffChunk<String>> {
    let old: Vec<String> = old.split_whitespace().map(str::to_string).collect();
    let new: Vec<String> = new.split_whitespace().map(str::to_string).collect();
    diff(&old, &new)
}

/// Tokens of the old side: kept plus deleted.
pub fn reconstruct_old<T: Clone>(chunks: &[DiffChunk<T>]) -> Vec<T> {
    let mut tokens = Vec::new();
    for chunk in chunks {
        match chunk {
            DiffChunk::Same(token) => tokens.push(token.clone()),
            DiffChunk::Changed { deleted, .. } => tokens.extend(deleted.iter().cloned()),
        }
    }
    tokens
}

/// Tokens of the new side: kept plus inserted.
pub fn reconstruct_new<T: Clone>(chunks: &[DiffChunk<T>]) -> Vec<T> {
    let mut tokens = Vec::new();
    for chunk in chunks {
        match chunk {
            DiffChunk::Same(token) => tokens.push(token.clone()),
            DiffChunk::Changed { inserted, .. } => tokens.extend(inserted.iter().cloned()),
        }
    }
    tokens
}
