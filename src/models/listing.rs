//! Prefix listing parameters and results, plus the paging rules every
//! backend shares.

use crate::models::object::ObjectMeta;
use base64::{Engine as _, engine::general_purpose};

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

#[derive(Clone, Debug)]
pub struct ListOptions {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub limit: usize,
    /// Opaque continuation token returned by a previous page.
    pub cursor: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            delimiter: Some("/".into()),
            limit: DEFAULT_LIST_LIMIT,
            cursor: None,
        }
    }
}

impl ListOptions {
    /// Key after which the listing resumes, if a cursor was supplied.
    pub fn start_after(&self) -> Option<String> {
        self.cursor
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(decode_cursor)
    }
}

/// One page of a prefix listing.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    pub common_prefixes: Vec<String>,
    pub truncated: bool,
    pub cursor: Option<String>,
}

/// Build one page out of `entries`.
///
/// `entries` must be ascending by key, already restricted to keys that start
/// with `opts.prefix` and sort after the cursor.
pub fn paginate<I>(entries: I, opts: &ListOptions) -> ListPage
where
    I: IntoIterator<Item = ObjectMeta>,
{
    let mut pager = Paginator::new(opts);
    for obj in entries {
        match pager.offer(&obj.key) {
            Step::Object => pager.push_object(obj),
            Step::Grouped => {}
            Step::Full => break,
        }
    }
    pager.finish()
}

/// What a `Paginator` did with an offered key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// The key is a page entry; hand its metadata to `push_object`.
    Object,
    /// The key was folded into a common prefix.
    Grouped,
    /// The page is full and more entries exist. Stop offering keys.
    Full,
}

/// Incremental page builder fed one key at a time, in ascending order.
///
/// Objects and common prefixes each count once toward the limit; a delimited
/// group is consumed whole so the next page never repeats a folder. Callers
/// only materialise metadata for keys answered with `Step::Object`.
#[derive(Debug)]
pub struct Paginator<'a> {
    prefix: &'a str,
    delimiter: Option<&'a str>,
    limit: usize,
    count: usize,
    open_group: Option<String>,
    last_key: Option<String>,
    page: ListPage,
}

impl<'a> Paginator<'a> {
    pub fn new(opts: &'a ListOptions) -> Self {
        Self {
            prefix: &opts.prefix,
            delimiter: opts.delimiter.as_deref().filter(|d| !d.is_empty()),
            limit: opts.limit.clamp(1, MAX_LIST_LIMIT),
            count: 0,
            open_group: None,
            last_key: None,
            page: ListPage::default(),
        }
    }

    pub fn offer(&mut self, key: &str) -> Step {
        if self.page.truncated {
            return Step::Full;
        }
        if self
            .open_group
            .as_deref()
            .is_some_and(|group| key.starts_with(group))
        {
            self.last_key = Some(key.to_string());
            return Step::Grouped;
        }
        self.open_group = None;

        if self.count == self.limit {
            self.page.truncated = true;
            return Step::Full;
        }
        self.count += 1;
        self.last_key = Some(key.to_string());

        match self
            .delimiter
            .and_then(|d| common_prefix(key, self.prefix, d))
        {
            Some(group) => {
                self.page.common_prefixes.push(group.clone());
                self.open_group = Some(group);
                Step::Grouped
            }
            None => Step::Object,
        }
    }

    pub fn push_object(&mut self, obj: ObjectMeta) {
        self.page.objects.push(obj);
    }

    pub fn finish(mut self) -> ListPage {
        if self.page.truncated {
            self.page.cursor = self.last_key.as_deref().map(encode_cursor);
        }
        self.page
    }
}

/// Compute the synthetic "folder" a key falls under for this listing.
///
/// Returns `None` when the key is a direct child of `prefix`.
pub fn common_prefix(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    let pos = rest.find(delimiter)?;
    let mut combined = String::with_capacity(prefix.len() + pos + delimiter.len());
    combined.push_str(prefix);
    combined.push_str(&rest[..pos + delimiter.len()]);
    Some(combined)
}

pub fn encode_cursor(key: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(key)
}

/// Decode a cursor; tokens that are not ours are used verbatim.
pub fn decode_cursor(token: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}
