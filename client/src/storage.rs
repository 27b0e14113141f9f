use gloo_storage::Storage as _;
use pilji_engine::{KeyValueStore, StoreError};

/// localStorage-backed store for the durable parcel snapshot.
#[derive(Debug, Default)]
pub struct BrowserLocalStore;

/// sessionStorage-backed store for the search-collection snapshot: cleared
/// when the tab closes, survives a reload.
#[derive(Debug, Default)]
pub struct BrowserSessionStore;

fn backend_error(context: &str, err: wasm_bindgen::JsValue) -> StoreError {
    StoreError::Backend(format!(
        "{context}: {}",
        err.as_string().unwrap_or_else(|| format!("{err:?}"))
    ))
}

impl KeyValueStore for BrowserLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        gloo_storage::LocalStorage::raw()
            .get_item(key)
            .map_err(|e| backend_error("localStorage.getItem", e))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        gloo_storage::LocalStorage::raw()
            .set_item(key, value)
            .map_err(|e| backend_error("localStorage.setItem", e))
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        gloo_storage::LocalStorage::raw()
            .remove_item(key)
            .map_err(|e| backend_error("localStorage.removeItem", e))
    }
}

impl KeyValueStore for BrowserSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        gloo_storage::SessionStorage::raw()
            .get_item(key)
            .map_err(|e| backend_error("sessionStorage.getItem", e))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        gloo_storage::SessionStorage::raw()
            .set_item(key, value)
            .map_err(|e| backend_error("sessionStorage.setItem", e))
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        gloo_storage::SessionStorage::raw()
            .remove_item(key)
            .map_err(|e| backend_error("sessionStorage.removeItem", e))
    }
}
