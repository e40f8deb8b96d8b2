//! Test doubles shared by the controller tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use keepr_client::{Method, NetRequest, NetResponse, Network};
use keepr_core::{Error, ResponseStore, StoreDb, StoreNames, StoredResponse, Stores};

pub const ORIGIN: &str = "http://localhost:8080";

pub fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond { status: u16, headers: BTreeMap<String, String>, body: Bytes },
    Fail,
}

/// A [`Network`] that answers from a script and records every request.
///
/// A `HEAD` with no script of its own falls back to the `GET` script with
/// the body dropped. Unscripted URLs answer 404.
#[derive(Debug, Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<(Method, String), Scripted>>,
    calls: Mutex<Vec<NetRequest>>,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, status: u16, headers: &[(&str, &str)], body: &'static [u8]) {
        self.script(Method::Get, url, status, headers, body);
    }

    pub fn serve_head(&self, url: &str, status: u16, headers: &[(&str, &str)]) {
        self.script(Method::Head, url, status, headers, b"");
    }

    pub fn fail(&self, method: Method, url: &str) {
        self.routes.lock().unwrap().insert((method, url.to_string()), Scripted::Fail);
    }

    pub fn calls(&self) -> Vec<NetRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.method == method).count()
    }

    fn script(&self, method: Method, url: &str, status: u16, headers: &[(&str, &str)], body: &'static [u8]) {
        let headers = headers.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.to_string())).collect();
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.to_string()), Scripted::Respond { status, headers, body: Bytes::from_static(body) });
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &NetRequest) -> Result<NetResponse, Error> {
        self.calls.lock().unwrap().push(request.clone());

        let scripted = {
            let routes = self.routes.lock().unwrap();
            routes.get(&(request.method, request.url.clone())).cloned().or_else(|| {
                (request.method == Method::Head)
                    .then(|| routes.get(&(Method::Get, request.url.clone())).cloned())
                    .flatten()
            })
        };

        match scripted {
            Some(Scripted::Respond { status, headers, body }) => Ok(NetResponse {
                url: request.url.clone(),
                status,
                headers,
                body: if request.method == Method::Head { Bytes::new() } else { body },
                fetch_ms: 1,
            }),
            Some(Scripted::Fail) => {
                Err(Error::Network { url: request.url.clone(), reason: "connection refused".to_string() })
            }
            None => Ok(NetResponse {
                url: request.url.clone(),
                status: 404,
                headers: BTreeMap::new(),
                body: Bytes::new(),
                fetch_ms: 1,
            }),
        }
    }
}

/// A store whose writes always fail; reads delegate to the wrapped store.
#[derive(Debug)]
pub struct ReadOnlyStore(pub Arc<dyn ResponseStore>);

#[async_trait]
impl ResponseStore for ReadOnlyStore {
    async fn put(&self, key: &str, _response: &StoredResponse) -> Result<(), Error> {
        Err(Error::Serialization(format!("read-only store rejected {key}")))
    }

    async fn match_key(&self, key: &str) -> Result<Option<StoredResponse>, Error> {
        self.0.match_key(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        self.0.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.0.keys().await
    }
}

/// Fresh in-memory stores under the default names.
pub async fn memory_stores() -> (StoreDb, Stores) {
    let db = StoreDb::open_in_memory().await.unwrap();
    let stores = Stores::open(&db, &StoreNames::versioned("pwa-assets", "v1")).await.unwrap();
    (db, stores)
}
