/*!
 * Move & Copy Tests
 * Capability-matched transfer across providers of differing I/O shapes
 */

use std::sync::Arc;

use polyfs::{
    FileOperation, FileService, FsError, MemoryFs, ProviderCapabilities, ProviderRegistry,
    ReadFileOptions, ResolveOptions, Uri, WriteOptions, WriteSource,
};

fn uri(s: &str) -> Uri {
    Uri::parse(s).unwrap()
}

fn register(registry: &ProviderRegistry, scheme: &str, provider: Arc<MemoryFs>) {
    std::mem::forget(registry.register(scheme, provider).unwrap());
}

fn service_with_mem() -> Arc<FileService> {
    let registry = ProviderRegistry::new();
    register(&registry, "mem", Arc::new(MemoryFs::new()));
    Arc::new(FileService::new(registry))
}

/// Deterministic pseudo-random payload
fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x2545f491u64;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

#[test]
fn test_move_then_move_back_restores() {
    let service = service_with_mem();
    service
        .write_file(&uri("mem:/a"), WriteSource::from("payload"), &WriteOptions::default())
        .unwrap();

    service.move_to(&uri("mem:/a"), &uri("mem:/b"), false).unwrap();
    assert!(!service.exists(&uri("mem:/a")));

    service.move_to(&uri("mem:/b"), &uri("mem:/a"), false).unwrap();
    assert!(!service.exists(&uri("mem:/b")));
    assert_eq!(
        service.read_file(&uri("mem:/a"), &ReadFileOptions::default()).unwrap().value,
        b"payload"
    );
}

#[test]
fn test_copy_leaves_source_intact() {
    let service = service_with_mem();
    let data = payload(10_000);
    service
        .write_file(&uri("mem:/src"), WriteSource::Buffer(data.clone()), &WriteOptions::default())
        .unwrap();

    let mut operations = service.subscribe_operations();
    service.copy_to(&uri("mem:/src"), &uri("mem:/dst"), false).unwrap();

    assert_eq!(
        service.read_file(&uri("mem:/src"), &ReadFileOptions::default()).unwrap().value,
        data
    );
    assert_eq!(
        service.read_file(&uri("mem:/dst"), &ReadFileOptions::default()).unwrap().value,
        data
    );

    let event = operations.try_recv().unwrap();
    assert_eq!(event.operation, FileOperation::Copy);
    assert_eq!(event.resource, uri("mem:/src"));
    assert_eq!(event.target, Some(uri("mem:/dst")));
}

#[test]
fn test_self_move_is_a_noop() {
    let service = service_with_mem();
    service
        .write_file(&uri("mem:/same"), WriteSource::from("keep"), &WriteOptions::default())
        .unwrap();

    service.move_to(&uri("mem:/same"), &uri("mem:/same"), false).unwrap();
    assert_eq!(
        service.read_file(&uri("mem:/same"), &ReadFileOptions::default()).unwrap().value,
        b"keep"
    );
}

#[test]
fn test_move_into_own_subtree_fails() {
    let service = service_with_mem();
    service
        .write_file(&uri("mem:/dir/f"), WriteSource::from("x"), &WriteOptions::default())
        .unwrap();

    assert!(service.move_to(&uri("mem:/dir"), &uri("mem:/dir/sub"), false).is_err());
    assert!(service.copy_to(&uri("mem:/dir"), &uri("mem:/dir/sub"), true).is_err());
}

#[test]
fn test_existing_target_needs_overwrite() {
    let service = service_with_mem();
    service
        .write_file(&uri("mem:/one"), WriteSource::from("one"), &WriteOptions::default())
        .unwrap();
    service
        .write_file(&uri("mem:/two"), WriteSource::from("two"), &WriteOptions::default())
        .unwrap();

    assert!(matches!(
        service.move_to(&uri("mem:/one"), &uri("mem:/two"), false),
        Err(FsError::FileMoveConflict(_))
    ));

    service.move_to(&uri("mem:/one"), &uri("mem:/two"), true).unwrap();
    assert!(!service.exists(&uri("mem:/one")));
    assert_eq!(
        service.read_file(&uri("mem:/two"), &ReadFileOptions::default()).unwrap().value,
        b"one"
    );
}

#[test]
fn test_case_insensitive_same_path_rules() {
    let registry = ProviderRegistry::new();
    register(
        &registry,
        "mem",
        Arc::new(MemoryFs::with_capabilities(
            ProviderCapabilities::FILE_READ_WRITE
                | ProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE,
        )),
    );
    let service = FileService::new(registry);

    service
        .write_file(&uri("mem:/File.txt"), WriteSource::from("x"), &WriteOptions::default())
        .unwrap();

    // Changing only the case is a legal move...
    service.move_to(&uri("mem:/File.txt"), &uri("mem:/file.txt"), false).unwrap();
    let stat = service
        .resolve(&uri("mem:/file.txt"), &ResolveOptions::metadata())
        .unwrap();
    assert_eq!(stat.name, "file.txt");

    // ...but a copy onto the same resource is not
    assert!(matches!(
        service.copy_to(&uri("mem:/file.txt"), &uri("mem:/FILE.TXT"), true),
        Err(FsError::FileMoveConflict(_))
    ));
}

#[test]
fn test_folder_copy_recurses() {
    let service = service_with_mem();
    for path in ["mem:/src/a.txt", "mem:/src/sub/b.txt", "mem:/src/sub/deep/c.txt"] {
        service
            .write_file(&uri(path), WriteSource::from(path), &WriteOptions::default())
            .unwrap();
    }

    service.copy_to(&uri("mem:/src"), &uri("mem:/dst"), false).unwrap();

    for (src, dst) in [
        ("mem:/src/a.txt", "mem:/dst/a.txt"),
        ("mem:/src/sub/b.txt", "mem:/dst/sub/b.txt"),
        ("mem:/src/sub/deep/c.txt", "mem:/dst/sub/deep/c.txt"),
    ] {
        assert_eq!(
            service.read_file(&uri(dst), &ReadFileOptions::default()).unwrap().value,
            src.as_bytes(),
            "copied {src}"
        );
    }
}

#[test]
fn test_cross_capability_copy_random_access_to_whole_file() {
    // Provider A: random-access only. Provider B: whole-file only.
    let registry = ProviderRegistry::new();
    register(
        &registry,
        "a",
        Arc::new(MemoryFs::with_capabilities(
            ProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE
                | ProviderCapabilities::PATH_CASE_SENSITIVE,
        )),
    );
    register(
        &registry,
        "b",
        Arc::new(MemoryFs::with_capabilities(
            ProviderCapabilities::FILE_READ_WRITE | ProviderCapabilities::PATH_CASE_SENSITIVE,
        )),
    );
    let service = FileService::new(registry);

    let data = payload(300 * 1024);
    service
        .write_file(&uri("a:/x"), WriteSource::Buffer(data.clone()), &WriteOptions::default())
        .unwrap();

    service.copy_to(&uri("a:/x"), &uri("b:/y"), false).unwrap();
    assert_eq!(
        service.read_file(&uri("b:/y"), &ReadFileOptions::default()).unwrap().value,
        data
    );
}

#[test]
fn test_cross_capability_copy_whole_file_to_random_access() {
    let registry = ProviderRegistry::new();
    register(
        &registry,
        "a",
        Arc::new(MemoryFs::with_capabilities(
            ProviderCapabilities::FILE_READ_WRITE | ProviderCapabilities::PATH_CASE_SENSITIVE,
        )),
    );
    register(
        &registry,
        "b",
        Arc::new(MemoryFs::with_capabilities(
            ProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE
                | ProviderCapabilities::PATH_CASE_SENSITIVE,
        )),
    );
    let service = FileService::new(registry);

    let data = payload(150 * 1024);
    service
        .write_file(&uri("a:/x"), WriteSource::Buffer(data.clone()), &WriteOptions::default())
        .unwrap();

    service.copy_to(&uri("a:/x"), &uri("b:/y"), false).unwrap();
    assert_eq!(
        service.read_file(&uri("b:/y"), &ReadFileOptions::default()).unwrap().value,
        data
    );
}

#[test]
fn test_cross_provider_move_reports_copy() {
    let registry = ProviderRegistry::new();
    register(&registry, "a", Arc::new(MemoryFs::new()));
    register(&registry, "b", Arc::new(MemoryFs::new()));
    let service = FileService::new(registry);

    service
        .write_file(&uri("a:/file"), WriteSource::from("crossing"), &WriteOptions::default())
        .unwrap();

    let mut operations = service.subscribe_operations();
    service.move_to(&uri("a:/file"), &uri("b:/file"), false).unwrap();

    assert!(!service.exists(&uri("a:/file")));
    assert_eq!(
        service.read_file(&uri("b:/file"), &ReadFileOptions::default()).unwrap().value,
        b"crossing"
    );

    // The transfer degraded to copy + delete; the final event says so
    let mut last = None;
    while let Ok(event) = operations.try_recv() {
        last = Some(event);
    }
    assert_eq!(last.unwrap().operation, FileOperation::Copy);
}

#[test]
fn test_cross_provider_folder_move() {
    let registry = ProviderRegistry::new();
    register(&registry, "a", Arc::new(MemoryFs::new()));
    register(&registry, "b", Arc::new(MemoryFs::new()));
    let service = FileService::new(registry);

    for path in ["a:/dir/x", "a:/dir/nested/y"] {
        service
            .write_file(&uri(path), WriteSource::from(path), &WriteOptions::default())
            .unwrap();
    }

    service.move_to(&uri("a:/dir"), &uri("b:/dir"), false).unwrap();

    assert!(!service.exists(&uri("a:/dir")));
    assert_eq!(
        service.read_file(&uri("b:/dir/x"), &ReadFileOptions::default()).unwrap().value,
        b"a:/dir/x"
    );
    assert_eq!(
        service
            .read_file(&uri("b:/dir/nested/y"), &ReadFileOptions::default())
            .unwrap()
            .value,
        b"a:/dir/nested/y"
    );
}
