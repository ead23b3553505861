//! In-memory stand-ins for the face oracle and object store
//!
//! The fake oracle recognizes people by label: every face in a stored image
//! carries the label of the person shown, and two faces match when their
//! labels are equal. Face ids are handed out as `face-1`, `face-2`, ...

use async_trait::async_trait;
use picsort_common::{Error, Result};
use picsort_faces::clients::{FaceOracle, IndexedFace, ObjectStore};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct OracleState {
    /// collection id -> (face id, label) in index order
    collections: HashMap<String, Vec<(String, String)>>,
    /// storage key -> labels of the faces in the image
    images: HashMap<String, Vec<String>>,
    /// storage key -> face ids to hand out instead of fresh ones
    fixed_ids: HashMap<String, Vec<String>>,
    next_face: u32,
    fail_index: HashSet<String>,
    panic_index: HashSet<String>,
    fail_search: HashSet<String>,
    fail_delete_faces: bool,
    fail_delete_collection: bool,
    hide_collections: bool,
    deleted_faces: Vec<String>,
    created_collections: Vec<String>,
    index_calls: usize,
    index_delay: Option<Duration>,
    indexing_now: usize,
    peak_indexing: usize,
    search_face_calls: usize,
    search_image_calls: usize,
    count_calls: usize,
}

#[derive(Default)]
pub struct FakeOracle {
    state: Mutex<OracleState>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the people visible in a stored image
    pub fn set_faces(&self, key: &str, labels: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(key.to_string(), labels.iter().map(|l| l.to_string()).collect());
    }

    /// Make indexing of `key` return these face ids
    pub fn set_face_ids(&self, key: &str, ids: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .fixed_ids
            .insert(key.to_string(), ids.iter().map(|i| i.to_string()).collect());
    }

    /// Index a face directly, with no photo behind it. Returns its face id.
    pub fn seed_face(&self, collection_id: &str, label: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_face += 1;
        let face_id = format!("face-{}", state.next_face);
        state
            .collections
            .entry(collection_id.to_string())
            .or_default()
            .push((face_id.clone(), label.to_string()));
        face_id
    }

    /// Make every `index_faces` call take this long, as a remote oracle would
    pub fn set_index_delay(&self, delay: Duration) {
        self.state.lock().unwrap().index_delay = Some(delay);
    }

    /// Most `index_faces` calls ever in flight at once
    pub fn peak_concurrent_indexing(&self) -> usize {
        self.state.lock().unwrap().peak_indexing
    }

    pub fn fail_index_for(&self, key: &str) {
        self.state.lock().unwrap().fail_index.insert(key.to_string());
    }

    pub fn panic_index_for(&self, key: &str) {
        self.state.lock().unwrap().panic_index.insert(key.to_string());
    }

    pub fn fail_search_for(&self, face_id: &str) {
        self.state.lock().unwrap().fail_search.insert(face_id.to_string());
    }

    pub fn clear_search_failures(&self) {
        self.state.lock().unwrap().fail_search.clear();
    }

    pub fn fail_delete_faces(&self, fail: bool) {
        self.state.lock().unwrap().fail_delete_faces = fail;
    }

    pub fn fail_delete_collection(&self, fail: bool) {
        self.state.lock().unwrap().fail_delete_collection = fail;
    }

    /// Report every collection as absent while still holding it, as a
    /// concurrent creator would observe
    pub fn hide_collections(&self, hide: bool) {
        self.state.lock().unwrap().hide_collections = hide;
    }

    pub fn drop_collection(&self, collection_id: &str) {
        self.state.lock().unwrap().collections.remove(collection_id);
    }

    pub fn has_collection(&self, collection_id: &str) -> bool {
        self.state.lock().unwrap().collections.contains_key(collection_id)
    }

    /// Face ids currently indexed in a collection
    pub fn faces_in(&self, collection_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection_id)
            .map(|faces| faces.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn deleted_faces(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_faces.clone()
    }

    pub fn created_collections(&self) -> Vec<String> {
        self.state.lock().unwrap().created_collections.clone()
    }

    pub fn index_calls(&self) -> usize {
        self.state.lock().unwrap().index_calls
    }

    pub fn search_face_calls(&self) -> usize {
        self.state.lock().unwrap().search_face_calls
    }

    pub fn search_image_calls(&self) -> usize {
        self.state.lock().unwrap().search_image_calls
    }

    pub fn count_calls(&self) -> usize {
        self.state.lock().unwrap().count_calls
    }
}

fn matches_for_label(faces: &[(String, String)], label: &str, exclude: Option<&str>) -> Vec<String> {
    faces
        .iter()
        .filter(|(id, l)| l == label && Some(id.as_str()) != exclude)
        .map(|(id, _)| id.clone())
        .collect()
}

#[async_trait]
impl FaceOracle for FakeOracle {
    async fn collection_exists(&self, collection_id: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(!state.hide_collections && state.collections.contains_key(collection_id))
    }

    async fn create_collection(&self, collection_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.collections.contains_key(collection_id) {
            return Err(Error::Conflict(format!("collection {} already exists", collection_id)));
        }
        state.collections.insert(collection_id.to_string(), Vec::new());
        state.created_collections.push(collection_id.to_string());
        Ok(())
    }

    async fn index_faces(&self, collection_id: &str, _bucket: &str, key: &str) -> Result<Vec<IndexedFace>> {
        let (should_panic, delay) = {
            let mut state = self.state.lock().unwrap();
            state.index_calls += 1;
            state.indexing_now += 1;
            state.peak_indexing = state.peak_indexing.max(state.indexing_now);
            (state.panic_index.contains(key), state.index_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.indexing_now -= 1;
        if should_panic {
            drop(state);
            panic!("simulated oracle crash while indexing {}", key);
        }

        if state.fail_index.contains(key) {
            return Err(Error::external("oracle", format!("cannot index {}", key)));
        }
        if !state.collections.contains_key(collection_id) {
            return Err(Error::external("oracle", format!("no collection {}", collection_id)));
        }

        let labels = state.images.get(key).cloned().unwrap_or_default();
        let mut fixed = state.fixed_ids.get(key).cloned().unwrap_or_default().into_iter();
        let mut indexed = Vec::new();

        for label in labels {
            let face_id = match fixed.next() {
                Some(id) => id,
                None => {
                    state.next_face += 1;
                    format!("face-{}", state.next_face)
                }
            };
            indexed.push(IndexedFace {
                face_id: face_id.clone(),
                confidence: 99.5,
            });
            if let Some(faces) = state.collections.get_mut(collection_id) {
                faces.push((face_id, label));
            }
        }

        Ok(indexed)
    }

    async fn search_by_face_id(&self, collection_id: &str, face_id: &str, _threshold: f32) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.search_face_calls += 1;

        if state.fail_search.contains(face_id) {
            return Err(Error::external("oracle", format!("search for {} failed", face_id)));
        }

        let faces = state
            .collections
            .get(collection_id)
            .ok_or_else(|| Error::external("oracle", format!("no collection {}", collection_id)))?;
        let label = faces
            .iter()
            .find(|(id, _)| id == face_id)
            .map(|(_, label)| label.clone())
            .ok_or_else(|| Error::external("oracle", format!("unknown face {}", face_id)))?;

        Ok(matches_for_label(faces, &label, Some(face_id)))
    }

    async fn search_by_image(
        &self,
        collection_id: &str,
        _bucket: &str,
        key: &str,
        _threshold: f32,
        max_results: u32,
    ) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.search_image_calls += 1;

        let label = match state.images.get(key).and_then(|labels| labels.first()) {
            Some(label) => label.clone(),
            None => return Err(Error::external("oracle", format!("no face in {}", key))),
        };
        let faces = state.collections.get(collection_id).cloned().unwrap_or_default();

        let mut found = matches_for_label(&faces, &label, None);
        found.truncate(max_results as usize);
        Ok(found)
    }

    async fn count_faces(&self, _bucket: &str, key: &str) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.count_calls += 1;
        Ok(state.images.get(key).map(Vec::len).unwrap_or(0))
    }

    async fn delete_faces(&self, collection_id: &str, face_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete_faces {
            return Err(Error::external("oracle", "delete faces unavailable"));
        }
        if let Some(faces) = state.collections.get_mut(collection_id) {
            faces.retain(|(id, _)| !face_ids.contains(id));
        }
        state.deleted_faces.extend(face_ids.iter().cloned());
        Ok(())
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete_collection {
            return Err(Error::external("oracle", "delete collection unavailable"));
        }
        state.collections.remove(collection_id);
        Ok(())
    }
}

#[derive(Default)]
struct StoreState {
    deleted: Vec<String>,
    delete_delay: Option<Duration>,
    presigned: Vec<String>,
    fail_deletes: bool,
}

/// Object store that issues fake URLs and records deletions
#[derive(Default)]
pub struct FakeObjectStore {
    state: Mutex<StoreState>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delete take this long before it lands
    pub fn set_delete_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delete_delay = Some(delay);
    }

    async fn delete_pause(&self) {
        let delay = self.state.lock().unwrap().delete_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.state.lock().unwrap().fail_deletes = fail;
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn presigned(&self) -> Vec<String> {
        self.state.lock().unwrap().presigned.clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn presign_upload(&self, bucket: &str, key: &str, content_type: &str, ttl: Duration) -> Result<String> {
        self.state.lock().unwrap().presigned.push(key.to_string());
        Ok(format!(
            "https://{}.objects.test/{}?method=PUT&content-type={}&expires={}",
            bucket,
            key,
            content_type,
            ttl.as_secs()
        ))
    }

    async fn presign_download(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        self.state.lock().unwrap().presigned.push(key.to_string());
        Ok(format!(
            "https://{}.objects.test/{}?method=GET&expires={}",
            bucket,
            key,
            ttl.as_secs()
        ))
    }

    async fn delete(&self, _bucket: &str, key: &str) -> Result<()> {
        self.delete_pause().await;
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes {
            return Err(Error::external("objects", format!("cannot delete {}", key)));
        }
        state.deleted.push(key.to_string());
        Ok(())
    }

    async fn delete_many(&self, _bucket: &str, keys: &[String]) -> Result<()> {
        self.delete_pause().await;
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes {
            return Err(Error::external("objects", format!("cannot delete {} objects", keys.len())));
        }
        state.deleted.extend(keys.iter().cloned());
        Ok(())
    }
}
