//! Icon-pack registration for the diagram library.
//!
//! Each pack is fetched from a CDN by trying version-qualified URLs in order
//! of preference (pinned major first, then a newer major, then unpinned).
//! The first payload that arrives wins. Results are cached per package and
//! candidate list, and the cache holds the in-flight future itself, so two
//! registrations racing for the same pack share one fetch sequence.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures_util::future::{join_all, LocalBoxFuture, Shared};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::error::FetchError;
use crate::platform::DiagramLibrary;

/// A pack to register: the name diagrams refer to and the npm package that
/// ships its icon definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IconPackSpec {
    pub name: String,
    pub package: String,
}

/// How candidate URLs for a package are spelled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IconCdn {
    pub base: String,
    /// Version qualifiers in preference order; an empty string means unpinned.
    pub versions: Vec<String>,
    /// Path of the JSON payload inside the package.
    pub file: String,
}

impl Default for IconCdn {
    fn default() -> Self {
        Self {
            base: "https://unpkg.com".to_owned(),
            versions: vec!["1".to_owned(), "2".to_owned(), String::new()],
            file: "icons.json".to_owned(),
        }
    }
}

impl IconCdn {
    /// Candidate payload URLs for `package`, most preferred first.
    pub fn candidates(&self, package: &str) -> Vec<String> {
        let base = self.base.trim_end_matches('/');
        let file = self.file.trim_start_matches('/');
        self.versions
            .iter()
            .map(|version| {
                if version.is_empty() {
                    format!("{base}/{package}/{file}")
                } else {
                    format!("{base}/{package}@{version}/{file}")
                }
            })
            .collect()
    }
}

/// A resolved pack as handed to the diagram library. `icons` is the opaque
/// JSON payload (an empty object when every candidate failed).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IconPack {
    pub name: String,
    pub icons: Value,
}

/// Fetches and decodes one JSON document.
pub trait IconFetcher {
    fn fetch_json(&self, url: &str) -> LocalBoxFuture<'static, Result<Value, FetchError>>;
}

/// [`IconFetcher`] backed by `reqwest`. Non-2xx responses are failures.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl IconFetcher for HttpFetcher {
    fn fetch_json(&self, url: &str) -> LocalBoxFuture<'static, Result<Value, FetchError>> {
        let client = self.client.clone();
        let url = url.to_owned();
        async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|source| FetchError::Http {
                    url: url.clone(),
                    source,
                })?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
            response
                .json::<Value>()
                .await
                .map_err(|source| FetchError::Http { url, source })
        }
        .boxed_local()
    }
}

/// [`IconFetcher`] that never touches the network.
#[derive(Clone, Copy, Default)]
pub struct OfflineFetcher;

impl IconFetcher for OfflineFetcher {
    fn fetch_json(&self, url: &str) -> LocalBoxFuture<'static, Result<Value, FetchError>> {
        let err = FetchError::Unavailable {
            url: url.to_owned(),
            reason: "offline mode".to_owned(),
        };
        async move { Err(err) }.boxed_local()
    }
}

/// Outcome of resolving one pack.
#[derive(Debug, Clone, PartialEq)]
struct Resolved {
    url: Option<String>,
    icons: Value,
}

type PendingPack = Shared<LocalBoxFuture<'static, Resolved>>;

/// Per-pack line of a [`RegistrationReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOutcome {
    pub name: String,
    /// Candidate URL that supplied the payload; `None` means it fell back to
    /// an empty pack.
    pub source: Option<String>,
}

/// What a call to [`IconPackRegistrar::register_packs`] did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrationReport {
    /// False when the diagram library (or its entry point) was missing.
    pub registered: bool,
    pub packs: Vec<PackOutcome>,
}

impl RegistrationReport {
    pub fn failed(&self) -> impl Iterator<Item = &PackOutcome> {
        self.packs.iter().filter(|pack| pack.source.is_none())
    }
}

/// Resolves icon packs and hands them to the diagram library.
pub struct IconPackRegistrar {
    fetcher: Rc<dyn IconFetcher>,
    cdn: IconCdn,
    cache: RefCell<HashMap<(String, Vec<String>), PendingPack>>,
}

impl IconPackRegistrar {
    pub fn new(fetcher: Rc<dyn IconFetcher>, cdn: IconCdn) -> Self {
        Self {
            fetcher,
            cdn,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Resolve every pack in `specs` and register the batch with `library`.
    ///
    /// Packs whose candidates all fail are registered with an empty payload
    /// so the rest still work. Without a library, or without its
    /// registration entry point, nothing is fetched and an error is logged.
    pub async fn register_packs(
        &self,
        library: Option<Rc<dyn DiagramLibrary>>,
        specs: &[IconPackSpec],
    ) -> RegistrationReport {
        let Some(library) = library.filter(|lib| lib.supports_icon_packs()) else {
            error!(packs = specs.len(), "diagram library or registerIconPacks missing; skipping icon packs");
            return RegistrationReport::default();
        };

        let resolved = join_all(specs.iter().map(|spec| self.resolve(spec))).await;

        let mut packs = Vec::with_capacity(specs.len());
        let mut outcomes = Vec::with_capacity(specs.len());
        for (spec, resolved) in specs.iter().zip(resolved) {
            outcomes.push(PackOutcome {
                name: spec.name.clone(),
                source: resolved.url,
            });
            packs.push(IconPack {
                name: spec.name.clone(),
                icons: resolved.icons,
            });
        }

        info!(packs = packs.len(), "registering icon packs");
        library.register_icon_packs(packs);
        RegistrationReport {
            registered: true,
            packs: outcomes,
        }
    }

    fn resolve(&self, spec: &IconPackSpec) -> PendingPack {
        let candidates = self.cdn.candidates(&spec.package);
        let key = (spec.package.clone(), candidates.clone());
        self.cache
            .borrow_mut()
            .entry(key)
            .or_insert_with(|| {
                let fetcher = Rc::clone(&self.fetcher);
                first_available(fetcher, spec.package.clone(), candidates)
                    .boxed_local()
                    .shared()
            })
            .clone()
    }
}

async fn first_available(
    fetcher: Rc<dyn IconFetcher>,
    package: String,
    candidates: Vec<String>,
) -> Resolved {
    for url in candidates {
        match fetcher.fetch_json(&url).await {
            Ok(icons) => {
                info!(package = %package, url = %url, "icon pack resolved");
                return Resolved {
                    url: Some(url),
                    icons,
                };
            }
            Err(err) => debug!(package = %package, error = %err, "icon pack candidate failed"),
        }
    }
    error!(package = %package, "no icon pack candidate succeeded; using empty pack");
    Resolved {
        url: None,
        icons: Value::Object(Map::new()),
    }
}
