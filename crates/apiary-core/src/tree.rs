//! Directory view of a request collection.
//!
//! Paths are slash-delimited; every segment but the last names a directory.
//! Empty segments (`"a//b"`, a leading `/`) are skipped, so `"/a/b"` and
//! `"a/b"` land in the same directory.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{EntryData, Kind, RequestId, RequestMap};

/// One directory level: the requests that live here and the
/// subdirectories below it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestTree {
    pub ids: Vec<RequestId>,
    pub dirs: BTreeMap<String, RequestTree>,
}

/// What a listing shows next to a request without loading its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestPreview {
    pub kind: Kind,
    pub sub_kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Listing {
    pub tree: RequestTree,
    pub requests: BTreeMap<RequestId, RequestPreview>,
}

impl RequestTree {
    fn insert(&mut self, dirs: &[&str], id: RequestId) {
        match dirs.split_first() {
            None => self.ids.push(id),
            Some((dir, rest)) => self
                .dirs
                .entry(dir.to_string())
                .or_default()
                .insert(rest, id),
        }
    }

    fn sort(&mut self) {
        self.ids.sort();
        self.dirs.values_mut().for_each(RequestTree::sort);
    }

    /// Number of requests at this level and below.
    pub fn len(&self) -> usize {
        self.ids.len() + self.dirs.values().map(RequestTree::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Group `requests` by directory and collect their previews.
///
/// Ids within a directory are sorted, so the result does not depend on
/// the iteration order of the map.
pub fn build_listing(requests: &RequestMap) -> Listing {
    let mut listing = Listing::default();
    for request in requests.values() {
        let segments: Vec<&str> = request.path.split('/').collect();
        let dirs: Vec<&str> = segments[..segments.len() - 1]
            .iter()
            .copied()
            .filter(|s| !s.is_empty())
            .collect();
        listing.tree.insert(&dirs, request.id.clone());
        listing.requests.insert(
            request.id.clone(),
            RequestPreview {
                kind: request.data.kind(),
                sub_kind: request.data.sub_kind().to_string(),
            },
        );
    }
    listing.tree.sort();
    listing
}
