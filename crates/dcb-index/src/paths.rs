use dcb_core::tag::{event_type_file_stem, tag_file_stem};
use dcb_core::Tag;
use std::path::{Path, PathBuf};

pub fn event_type_index_dir(store_dir: &Path) -> PathBuf {
    store_dir.join("Indices").join("EventType")
}

pub fn tag_index_dir(store_dir: &Path) -> PathBuf {
    store_dir.join("Indices").join("Tags")
}

pub fn event_type_index_file(store_dir: &Path, event_type: &str) -> PathBuf {
    event_type_index_dir(store_dir).join(format!("{}.json", event_type_file_stem(event_type)))
}

pub fn tag_index_file(store_dir: &Path, tag: &Tag) -> PathBuf {
    tag_index_dir(store_dir).join(format!("{}.json", tag_file_stem(tag)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_and_tag_files_land_in_distinct_subdirs() {
        let root = Path::new("/store");
        let tag = Tag::new("env", "prod").unwrap();
        assert!(event_type_index_file(root, "Created")
            .starts_with(root.join("Indices").join("EventType")));
        assert!(tag_index_file(root, &tag).starts_with(root.join("Indices").join("Tags")));
    }
}
