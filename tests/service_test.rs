/*!
 * File Service Tests
 * End-to-end coverage of resolve/read/write/delete through the service
 */

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use polyfs::{
    CreateOptions,
    CancellationToken, DeleteOptions, FileService, FsError, MemoryFs, ProviderCapabilities,
    ProviderRegistry, ReadFileOptions, ResolveOptions, Uri, WriteOptions, WriteSource,
    ETAG_DISABLED,
};

fn uri(s: &str) -> Uri {
    Uri::parse(s).unwrap()
}

fn service_with_mem() -> (Arc<FileService>, Arc<MemoryFs>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = ProviderRegistry::new();
    let provider = Arc::new(MemoryFs::new());
    let registration = registry.register("mem", provider.clone()).unwrap();
    std::mem::forget(registration);
    (Arc::new(FileService::new(registry)), provider)
}

#[test]
fn test_write_then_read_roundtrip() {
    let (service, _) = service_with_mem();

    service
        .write_file(&uri("mem:/a"), WriteSource::from("hello"), &WriteOptions::default())
        .unwrap();

    let content = service
        .read_file(&uri("mem:/a"), &ReadFileOptions::default())
        .unwrap();
    assert_eq!(content.value, b"hello");

    let stat = service
        .resolve(&uri("mem:/a"), &ResolveOptions::metadata())
        .unwrap();
    assert_eq!(stat.size, 5);
    assert!(stat.is_file());
}

#[test]
fn test_roundtrip_survives_arbitrary_sizes() {
    let (service, _) = service_with_mem();

    // Empty, single byte, and larger than the 64 KiB chunk size
    for size in [0usize, 1, 64 * 1024 + 17, 300 * 1024] {
        let payload: Vec<u8> = (0..size).map(|i| (i * 31 % 251) as u8).collect();
        let target = uri(&format!("mem:/blob-{size}"));
        service
            .write_file(&target, WriteSource::Buffer(payload.clone()), &WriteOptions::default())
            .unwrap();
        let content = service.read_file(&target, &ReadFileOptions::default()).unwrap();
        assert_eq!(content.value, payload, "size {size}");
    }
}

#[test]
fn test_concurrent_writes_serialize_to_last_enqueued() {
    let (service, _) = service_with_mem();
    let target = uri("mem:/contended");

    let mut writers = Vec::new();
    for payload in ["a", "ab", "abc"] {
        let service = Arc::clone(&service);
        let target = target.clone();
        writers.push(thread::spawn(move || {
            service
                .write_file(&target, WriteSource::from(payload), &WriteOptions::default())
                .unwrap();
        }));
        // Stagger enqueue order so "abc" is last
        thread::sleep(Duration::from_millis(30));
    }

    // An observer mid-sequence sees nothing or one of the enqueued payloads
    let observed = service.read_file(&target, &ReadFileOptions::default());
    match observed {
        Ok(content) => assert!(matches!(
            content.value.as_slice(),
            b"a" | b"ab" | b"abc"
        )),
        Err(FsError::FileNotFound(_)) => {}
        Err(other) => panic!("unexpected observer error: {other}"),
    }

    for writer in writers {
        writer.join().unwrap();
    }
    let content = service.read_file(&target, &ReadFileOptions::default()).unwrap();
    assert_eq!(content.value, b"abc");
}

#[test]
fn test_write_creates_missing_ancestors() {
    let (service, _) = service_with_mem();

    service
        .write_file(&uri("mem:/d/e/f"), WriteSource::from("deep"), &WriteOptions::default())
        .unwrap();

    assert!(service
        .resolve(&uri("mem:/d"), &ResolveOptions::default())
        .unwrap()
        .is_directory());
    assert!(service
        .resolve(&uri("mem:/d/e"), &ResolveOptions::default())
        .unwrap()
        .is_directory());
    assert_eq!(
        service
            .read_file(&uri("mem:/d/e/f"), &ReadFileOptions::default())
            .unwrap()
            .value,
        b"deep"
    );
}

#[test]
fn test_mkdirp_rejects_file_ancestor() {
    let (service, _) = service_with_mem();

    service
        .write_file(&uri("mem:/plain"), WriteSource::from("x"), &WriteOptions::default())
        .unwrap();

    let result = service.write_file(
        &uri("mem:/plain/child"),
        WriteSource::from("y"),
        &WriteOptions::default(),
    );
    assert!(matches!(result, Err(FsError::FileNotADirectory(_))));
}

#[test]
fn test_failed_write_does_not_strand_queue() {
    let (service, _) = service_with_mem();

    service
        .write_file(&uri("mem:/block"), WriteSource::from("f"), &WriteOptions::default())
        .unwrap();
    // Writing below a file fails in preflight
    assert!(service
        .write_file(&uri("mem:/block/x"), WriteSource::from("y"), &WriteOptions::default())
        .is_err());

    // The same key still accepts work
    service
        .write_file(&uri("mem:/block"), WriteSource::from("g"), &WriteOptions::default())
        .unwrap();
    assert_eq!(
        service
            .read_file(&uri("mem:/block"), &ReadFileOptions::default())
            .unwrap()
            .value,
        b"g"
    );
}

#[test]
fn test_etag_mismatch_write_is_rejected() {
    let (service, _) = service_with_mem();
    let target = uri("mem:/guarded");

    let stat = service
        .write_file(&target, WriteSource::from("original"), &WriteOptions::default())
        .unwrap();

    // Someone else changes the file (and its size)
    service
        .write_file(&target, WriteSource::from("changed externally"), &WriteOptions::default())
        .unwrap();

    let result = service.write_file(
        &target,
        WriteSource::from("stale"),
        &WriteOptions {
            etag: Some(stat.etag.clone()),
            mtime: Some(stat.mtime),
        },
    );
    assert!(matches!(result, Err(FsError::FileModifiedSince(_))));
    assert_eq!(
        service
            .read_file(&target, &ReadFileOptions::default())
            .unwrap()
            .value,
        b"changed externally"
    );
}

#[test]
fn test_size_neutral_timestamp_advance_does_not_conflict() {
    let (service, _) = service_with_mem();
    let target = uri("mem:/coarse");

    let stat = service
        .write_file(&target, WriteSource::from("12345"), &WriteOptions::default())
        .unwrap();
    // Same size, newer mtime: the caller-mtime etag comparison forgives this
    service
        .write_file(&target, WriteSource::from("abcde"), &WriteOptions::default())
        .unwrap();

    let result = service.write_file(
        &target,
        WriteSource::from("fresh"),
        &WriteOptions {
            etag: Some(stat.etag.clone()),
            mtime: Some(stat.mtime),
        },
    );
    assert!(result.is_ok());
}

#[test]
fn test_disabled_etag_skips_the_check() {
    let (service, _) = service_with_mem();
    let target = uri("mem:/unguarded");

    let stat = service
        .write_file(&target, WriteSource::from("one"), &WriteOptions::default())
        .unwrap();
    service
        .write_file(&target, WriteSource::from("two two"), &WriteOptions::default())
        .unwrap();

    let result = service.write_file(
        &target,
        WriteSource::from("three"),
        &WriteOptions {
            etag: Some(ETAG_DISABLED.to_string()),
            mtime: Some(stat.mtime),
        },
    );
    assert!(result.is_ok());
}

#[test]
fn test_read_with_matching_etag_short_circuits() {
    let (service, _) = service_with_mem();
    let target = uri("mem:/cached");

    let stat = service
        .write_file(&target, WriteSource::from("content"), &WriteOptions::default())
        .unwrap();

    let result = service.read_file(
        &target,
        &ReadFileOptions {
            etag: Some(stat.etag),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(FsError::FileNotModifiedSince(_))));
}

#[test]
fn test_read_directory_fails() {
    let (service, _) = service_with_mem();
    service.create_folder(&uri("mem:/dir")).unwrap();
    assert!(matches!(
        service.read_file(&uri("mem:/dir"), &ReadFileOptions::default()),
        Err(FsError::FileIsDirectory(_))
    ));
}

#[test]
fn test_read_window_past_end_truncates() {
    let (service, _) = service_with_mem();
    let target = uri("mem:/window");
    service
        .write_file(&target, WriteSource::from("hello"), &WriteOptions::default())
        .unwrap();

    let content = service
        .read_file(
            &target,
            &ReadFileOptions {
                position: Some(3),
                length: Some(100),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(content.value, b"lo");
}

#[test]
fn test_buffered_read_through_handles() {
    // A provider with only the random-access shape forces the chunked path
    let registry = ProviderRegistry::new();
    let provider = Arc::new(MemoryFs::with_capabilities(
        ProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE | ProviderCapabilities::PATH_CASE_SENSITIVE,
    ));
    std::mem::forget(registry.register("mem", provider).unwrap());
    let service = FileService::new(registry);

    let payload: Vec<u8> = (0..200_000).map(|i| (i % 256) as u8).collect();
    service
        .write_file(&uri("mem:/big"), WriteSource::Buffer(payload.clone()), &WriteOptions::default())
        .unwrap();

    let content = service
        .read_file(&uri("mem:/big"), &ReadFileOptions::default())
        .unwrap();
    assert_eq!(content.value, payload);
}

#[test]
fn test_cancelled_stream_read_aborts() {
    let registry = ProviderRegistry::new();
    let provider = Arc::new(MemoryFs::with_capabilities(
        ProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE | ProviderCapabilities::PATH_CASE_SENSITIVE,
    ));
    std::mem::forget(registry.register("mem", provider).unwrap());
    let service = FileService::new(registry);

    // Larger than the stream can buffer, so the pump must block until read
    let payload = vec![1u8; 1024 * 1024];
    service
        .write_file(&uri("mem:/huge"), WriteSource::Buffer(payload), &WriteOptions::default())
        .unwrap();

    let token = CancellationToken::new();
    let stream = service
        .read_file_stream(&uri("mem:/huge"), &ReadFileOptions::default(), &token)
        .unwrap();
    token.cancel();
    thread::sleep(Duration::from_millis(50));

    assert!(matches!(stream.stream.consume(), Err(FsError::Cancelled)));
}

#[test]
fn test_streamed_write_input() {
    let (service, _) = service_with_mem();
    let (writer, stream) = polyfs::stream::byte_stream();

    let producer = thread::spawn(move || {
        for chunk in [b"str".as_slice(), b"eam".as_slice(), b"ed".as_slice()] {
            writer.write(chunk.to_vec()).unwrap();
        }
        writer.finish();
    });

    service
        .write_file(&uri("mem:/streamed"), WriteSource::Stream(stream), &WriteOptions::default())
        .unwrap();
    producer.join().unwrap();

    assert_eq!(
        service
            .read_file(&uri("mem:/streamed"), &ReadFileOptions::default())
            .unwrap()
            .value,
        b"streamed"
    );
}

#[test]
fn test_create_file_respects_overwrite() {
    let (service, _) = service_with_mem();
    let target = uri("mem:/fresh");

    service
        .create_file(&target, WriteSource::from("v1"), &CreateOptions { overwrite: false })
        .unwrap();
    assert!(matches!(
        service.create_file(&target, WriteSource::from("v2"), &CreateOptions { overwrite: false }),
        Err(FsError::FileModifiedSince(_))
    ));
    service
        .create_file(&target, WriteSource::from("v3"), &CreateOptions { overwrite: true })
        .unwrap();
    assert_eq!(
        service.read_file(&target, &ReadFileOptions::default()).unwrap().value,
        b"v3"
    );
}

#[test]
fn test_non_recursive_delete_of_populated_dir_fails() {
    let (service, _) = service_with_mem();
    service
        .write_file(&uri("mem:/dir/child"), WriteSource::from("x"), &WriteOptions::default())
        .unwrap();

    assert!(matches!(
        service.del(&uri("mem:/dir"), DeleteOptions { recursive: false, use_trash: false }),
        Err(FsError::DirectoryNotEmpty(_))
    ));
    // Still intact
    assert!(service.exists(&uri("mem:/dir/child")));

    service
        .del(&uri("mem:/dir"), DeleteOptions { recursive: true, use_trash: false })
        .unwrap();
    assert!(!service.exists(&uri("mem:/dir")));
}

#[test]
fn test_delete_missing_and_trash_requirements() {
    let (service, _) = service_with_mem();

    assert!(matches!(
        service.del(&uri("mem:/nope"), DeleteOptions::default()),
        Err(FsError::FileNotFound(_))
    ));

    service
        .write_file(&uri("mem:/trashable"), WriteSource::from("x"), &WriteOptions::default())
        .unwrap();
    // The memory provider has no trash capability
    assert!(matches!(
        service.del(&uri("mem:/trashable"), DeleteOptions { recursive: false, use_trash: true }),
        Err(FsError::NotSupported(_))
    ));
}

#[test]
fn test_unregistered_scheme_has_no_provider() {
    let (service, _) = service_with_mem();
    assert!(matches!(
        service.resolve(&uri("gone:/x"), &ResolveOptions::default()),
        Err(FsError::NoProvider(_))
    ));
}

#[test]
fn test_resolve_expands_seeded_descendants() {
    let (service, _) = service_with_mem();
    for path in ["mem:/tree/a/deep/leaf.txt", "mem:/tree/b/other.txt"] {
        service
            .write_file(&uri(path), WriteSource::from("x"), &WriteOptions::default())
            .unwrap();
    }

    // Without seeds only the first level is listed
    let stat = service
        .resolve(&uri("mem:/tree"), &ResolveOptions::default())
        .unwrap();
    let children = stat.children.unwrap();
    let a = children.iter().find(|c| c.name == "a").unwrap();
    assert!(a.children.is_none());

    // Seeding a descendant expands the chain down to it
    let stat = service
        .resolve(
            &uri("mem:/tree"),
            &ResolveOptions {
                resolve_to: vec![uri("mem:/tree/a/deep")],
                ..Default::default()
            },
        )
        .unwrap();
    let children = stat.children.unwrap();
    let a = children.iter().find(|c| c.name == "a").unwrap();
    let deep = a.children.as_ref().unwrap().iter().find(|c| c.name == "deep").unwrap();
    assert!(deep.children.is_some());
}

#[test]
fn test_resolve_single_child_chains() {
    let (service, _) = service_with_mem();
    service
        .write_file(&uri("mem:/chain/only/one/file.txt"), WriteSource::from("x"), &WriteOptions::default())
        .unwrap();

    let stat = service
        .resolve(
            &uri("mem:/chain"),
            &ResolveOptions {
                resolve_single_child_descendants: true,
                ..Default::default()
            },
        )
        .unwrap();
    // Each level has exactly one child, so the whole chain is expanded
    let only = &stat.children.unwrap()[0];
    let one = &only.children.as_ref().unwrap()[0];
    assert_eq!(one.children.as_ref().unwrap()[0].name, "file.txt");
}

#[test]
fn test_exists_and_resolve_all() {
    let (service, _) = service_with_mem();
    service
        .write_file(&uri("mem:/here"), WriteSource::from("x"), &WriteOptions::default())
        .unwrap();

    assert!(service.exists(&uri("mem:/here")));
    assert!(!service.exists(&uri("mem:/missing")));

    let results = service.resolve_all(&[
        (uri("mem:/here"), ResolveOptions::metadata()),
        (uri("mem:/missing"), ResolveOptions::metadata()),
    ]);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(FsError::FileNotFound(_))));
}
