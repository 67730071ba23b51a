//! Tag changes - `tag add`, `tag rm` and `ls tags`

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use super::versions::{PathListing, VersionEntry, Versioned, list_paths};
use crate::location::RootLocation;
use crate::model::{Item, Tag};
use crate::pipeline::{Operation, PipelineError, RunSummary, operation};
use crate::selection::SelectionPolicy;
use crate::store::{Enumerator, ObjectTagging};
use crate::{S3kitError, output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    Add,
    Remove,
}

/// A change to the tag set of every selected version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagChange {
    /// Set these tags, overwriting existing values
    Add(Vec<Tag>),
    /// Drop tags with these keys
    Remove(Vec<String>),
}

impl TagChange {
    /// Parse `--tags` values; each value may hold several comma separated specs
    ///
    /// In add mode a spec must look like `key=value`; anything else is
    /// ignored. In remove mode a spec is a key, optionally followed by `=...`.
    /// A key given twice keeps its last value.
    #[must_use]
    pub fn parse<S: AsRef<str>>(mode: TagMode, specs: &[S]) -> Self {
        let specs = specs
            .iter()
            .flat_map(|s| s.as_ref().split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match mode {
            TagMode::Add => {
                let mut tags: Vec<Tag> = Vec::new();
                for (key, value) in specs.filter_map(|s| s.split_once('=')) {
                    if key.is_empty() {
                        continue;
                    }
                    match tags.iter_mut().find(|t| t.key == key) {
                        Some(tag) => tag.value = value.to_string(),
                        None => tags.push(Tag::new(key, value)),
                    }
                }
                Self::Add(tags)
            }
            TagMode::Remove => {
                let mut keys: Vec<String> = Vec::new();
                for spec in specs {
                    let key = match spec.split_once('=') {
                        Some((key, _)) if !key.is_empty() => key,
                        _ => spec,
                    };
                    if !keys.iter().any(|k| k == key) {
                        keys.push(key.to_string());
                    }
                }
                Self::Remove(keys)
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Add(tags) => tags.is_empty(),
            Self::Remove(keys) => keys.is_empty(),
        }
    }

    /// Apply the change to a tag set in place
    ///
    /// Adding keeps the position of keys already present and appends new
    /// ones. Removing keeps the order of the remaining tags.
    pub fn apply(&self, tags: &mut Vec<Tag>) {
        match self {
            Self::Add(new) => {
                for tag in new {
                    match tags.iter_mut().find(|t| t.key == tag.key) {
                        Some(existing) => existing.value.clone_from(&tag.value),
                        None => tags.push(tag.clone()),
                    }
                }
            }
            Self::Remove(keys) => tags.retain(|t| !keys.contains(&t.key)),
        }
    }
}

impl fmt::Display for TagChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(tags) => {
                let tags: Vec<String> = tags.iter().map(ToString::to_string).collect();
                write!(f, "add {}", tags.join(","))
            }
            Self::Remove(keys) => write!(f, "remove {}", keys.join(",")),
        }
    }
}

/// Read-modify-write of the tag set of each version it is applied to
pub fn tag_operation<'a, C>(client: &'a C, change: &'a TagChange) -> impl Operation + 'a
where
    C: ObjectTagging + ?Sized,
{
    operation(move |container, item| {
        let mut tags = client.get_tags(container, &item.key, &item.version_id)?;
        change.apply(&mut tags);
        info!("tag {change}: {}@{}", item.url(container), item.version_id);
        client.put_tags(container, &item.key, &item.version_id, &tags)?;
        Ok(())
    })
}

/// Tags of one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionTags {
    #[serde(flatten)]
    pub version: VersionEntry,
    /// `key=value` pairs
    pub tags: Vec<String>,
}

impl Versioned for VersionTags {
    fn version(&self) -> &VersionEntry {
        &self.version
    }
}

pub type PathTags = PathListing<VersionTags>;

fn describe_tags<C: ObjectTagging + ?Sized>(client: &C, container: &str, item: &Item) -> VersionTags {
    let tags = match client.get_tags(container, &item.key, &item.version_id) {
        Ok(tags) => tags.iter().map(ToString::to_string).collect(),
        Err(e) => {
            warn!(
                "Can't get tags for {} version {}: {e}",
                item.url(container),
                item.version_id
            );
            Vec::new()
        }
    };
    VersionTags {
        version: VersionEntry::from(item),
        tags,
    }
}

/// Tags of every selected version under `roots`, grouped by path
///
/// # Errors
/// Returns the pipeline error of the run. Failed tag reads are logged and
/// listed as empty.
pub fn list_tags<S>(
    store: &S,
    roots: &[RootLocation],
    policy: &SelectionPolicy,
    workers: usize,
) -> Result<Vec<PathTags>, PipelineError>
where
    S: Enumerator + ObjectTagging + ?Sized,
{
    list_paths(store, roots, policy, workers, |container, item| {
        describe_tags(store, container, item)
    })
}

/// Execute `tag add` / `tag rm`
///
/// # Errors
/// Returns an error if no usable tag was given or the run fails.
pub fn execute<S>(
    store: &S,
    roots: &[RootLocation],
    policy: &SelectionPolicy,
    workers: usize,
    change: &TagChange,
    quiet: bool,
) -> Result<RunSummary, S3kitError>
where
    S: Enumerator + ObjectTagging + ?Sized,
{
    if change.is_empty() {
        return Err(S3kitError::InvalidInput(
            "No usable tags given (expected key=value for add, key for rm)".into(),
        ));
    }
    let summary = crate::pipeline::run(store, roots, tag_operation(store, change), policy, workers)?;
    if !quiet {
        println!("{}", output::run_summary(&format!("tag {change}"), &summary));
    }
    Ok(summary)
}

/// Execute `ls tags`
///
/// # Errors
/// Returns an error if the listing fails or output cannot be written.
pub fn execute_list<S>(
    store: &S,
    roots: &[RootLocation],
    policy: &SelectionPolicy,
    workers: usize,
    json: bool,
    quiet: bool,
) -> Result<(), S3kitError>
where
    S: Enumerator + ObjectTagging + ?Sized,
{
    let listings = list_tags(store, roots, policy, workers)?;
    if json {
        return output::print_json(&listings);
    }
    for listing in &listings {
        println!("{}", output::path_header(&listing.path, quiet));
        for entry in &listing.versions {
            println!("{}", output::tags_line(&entry.version, &entry.tags, quiet));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BoxError;
    use crate::store::MemoryStore;

    fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
        pairs.iter().map(|(k, v)| Tag::new(*k, *v)).collect()
    }

    #[test]
    fn test_parse_add_ignores_specs_without_value() {
        let change = TagChange::parse(TagMode::Add, &["a=1,b", "c=3", "=x", "a=2"]);
        assert_eq!(change, TagChange::Add(tags(&[("a", "2"), ("c", "3")])));
    }

    #[test]
    fn test_parse_add_keeps_equals_in_value() {
        let change = TagChange::parse(TagMode::Add, &["expr=a=b"]);
        assert_eq!(change, TagChange::Add(tags(&[("expr", "a=b")])));
    }

    #[test]
    fn test_parse_remove_takes_keys() {
        let change = TagChange::parse(TagMode::Remove, &["a", "b=1,a", ""]);
        assert_eq!(change, TagChange::Remove(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_add_overwrites_in_place_and_appends() {
        let mut set = tags(&[("a", "1"), ("b", "2")]);
        TagChange::Add(tags(&[("b", "20"), ("c", "3")])).apply(&mut set);
        assert_eq!(set, tags(&[("a", "1"), ("b", "20"), ("c", "3")]));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut set = tags(&[("a", "1"), ("b", "2"), ("c", "3")]);
        TagChange::Remove(vec!["a".into(), "missing".into()]).apply(&mut set);
        assert_eq!(set, tags(&[("b", "2"), ("c", "3")]));
    }

    #[test]
    fn test_tag_operation_on_selected_versions() {
        let store = MemoryStore::new()
            .with_object("b", "k", "v1", "")
            .with_object("b", "k", "v2", "")
            .with_tags("b", "k", "v2", tags(&[("team", "old")]));
        let change = TagChange::parse(TagMode::Add, &["team=infra"]);
        let roots = vec![RootLocation::new("b", "")];

        crate::pipeline::run(
            &store,
            &roots,
            tag_operation(&store, &change),
            &SelectionPolicy::CurrentOnly,
            2,
        )
        .unwrap();

        assert_eq!(store.get_tags("b", "k", "v2").unwrap(), tags(&[("team", "infra")]));
        assert!(store.get_tags("b", "k", "v1").unwrap().is_empty());
    }

    #[test]
    fn test_tag_read_failure_is_fatal() {
        let store = MemoryStore::new()
            .with_object("b", "k", "v1", "")
            .with_unreadable("b", "k");
        let change = TagChange::parse(TagMode::Remove, &["team"]);
        let result = crate::pipeline::run(
            &store,
            &[RootLocation::new("b", "")],
            tag_operation(&store, &change),
            &SelectionPolicy::All,
            1,
        );
        assert!(matches!(result, Err(PipelineError::Operation { key, .. }) if key == "k"));
    }

    #[test]
    fn test_list_tags_with_unreadable_version() {
        let store = MemoryStore::new()
            .with_object("b", "a", "a1", "")
            .with_object("b", "z", "z1", "")
            .with_tags("b", "a", "a1", tags(&[("x", "1"), ("y", "2")]))
            .with_unreadable("b", "z");
        let listings = list_tags(
            &store,
            &[RootLocation::new("b", "")],
            &SelectionPolicy::All,
            2,
        )
        .unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].versions[0].tags, vec!["x=1", "y=2"]);
        assert!(listings[1].versions[0].tags.is_empty());
    }

    #[test]
    fn test_execute_rejects_empty_change() {
        let store = MemoryStore::new().with_object("b", "k", "v1", "");
        let change = TagChange::parse(TagMode::Add, &["novalue"]);
        let result = execute(
            &store,
            &[RootLocation::new("b", "")],
            &SelectionPolicy::All,
            1,
            &change,
            true,
        );
        assert!(matches!(result, Err(S3kitError::InvalidInput(_))));
    }
}
