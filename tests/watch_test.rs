/*!
 * Watch Tests
 * Ref-counted sharing of provider-level watches
 */

use std::sync::Arc;

use polyfs::{FileService, MemoryFs, ProviderRegistry, Uri, WatchOptions};

fn uri(s: &str) -> Uri {
    Uri::parse(s).unwrap()
}

fn service_with_mem() -> (FileService, Arc<MemoryFs>) {
    let registry = ProviderRegistry::new();
    let provider = Arc::new(MemoryFs::new());
    std::mem::forget(registry.register("mem", provider.clone()).unwrap());
    (FileService::new(registry), provider)
}

#[test]
fn test_identical_watches_share_one_provider_watch() {
    let (service, provider) = service_with_mem();
    let options = WatchOptions {
        recursive: true,
        excludes: Vec::new(),
    };

    let first = service.watch(&uri("mem:/root"), options.clone()).unwrap();
    let second = service.watch(&uri("mem:/root"), options).unwrap();
    assert_eq!(provider.watch_count(), 1);

    first.dispose();
    assert_eq!(provider.watch_count(), 1);

    second.dispose();
    assert_eq!(provider.watch_count(), 0);
}

#[test]
fn test_different_options_open_distinct_watches() {
    let (service, provider) = service_with_mem();

    let recursive = service
        .watch(
            &uri("mem:/root"),
            WatchOptions {
                recursive: true,
                excludes: Vec::new(),
            },
        )
        .unwrap();
    let flat = service
        .watch(
            &uri("mem:/root"),
            WatchOptions {
                recursive: false,
                excludes: Vec::new(),
            },
        )
        .unwrap();
    let excluded = service
        .watch(
            &uri("mem:/root"),
            WatchOptions {
                recursive: true,
                excludes: vec!["**/node_modules/**".to_string()],
            },
        )
        .unwrap();

    assert_eq!(provider.watch_count(), 3);
    drop(recursive);
    drop(flat);
    drop(excluded);
    assert_eq!(provider.watch_count(), 0);
}

#[test]
fn test_watch_disposal_is_idempotent() {
    let (service, provider) = service_with_mem();

    let watch = service
        .watch(&uri("mem:/root"), WatchOptions::default())
        .unwrap();
    assert_eq!(provider.watch_count(), 1);

    watch.dispose();
    watch.dispose();
    drop(watch);
    assert_eq!(provider.watch_count(), 0);
}

#[test]
fn test_rewatch_after_full_disposal_reopens() {
    let (service, provider) = service_with_mem();

    let watch = service
        .watch(&uri("mem:/root"), WatchOptions::default())
        .unwrap();
    watch.dispose();
    assert_eq!(provider.watch_count(), 0);

    let watch = service
        .watch(&uri("mem:/root"), WatchOptions::default())
        .unwrap();
    assert_eq!(provider.watch_count(), 1);
    drop(watch);
}
