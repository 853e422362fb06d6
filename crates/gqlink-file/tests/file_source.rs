//! File credential source tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gqlink_core::{CredentialSource, Subscription};
use gqlink_file::{FileCredentialSource, load};

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Auth(bool),
    Token,
}

type Recorded = (Arc<Mutex<Vec<Seen>>>, Vec<Subscription>);

fn record(source: &FileCredentialSource) -> Recorded {
    let seen = Arc::new(Mutex::new(Vec::new()));

    let auth = seen.clone();
    let on_auth = source.on_auth_state_changed(Box::new(move |signed_in| {
        auth.lock().unwrap().push(Seen::Auth(signed_in));
    }));
    let token = seen.clone();
    let on_token = source.on_token_changed(Box::new(move || {
        token.lock().unwrap().push(Seen::Token);
    }));

    (seen, vec![on_auth, on_token])
}

async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

#[tokio::test]
async fn missing_file_is_signed_out() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileCredentialSource::open(dir.path().join("credentials.json")).unwrap();

    assert!(!source.is_authenticated().unwrap());
    assert_eq!(source.token().unwrap(), None);
}

#[tokio::test]
async fn existing_file_is_signed_in() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    gqlink_file::save(&path, "abc").unwrap();

    let source = FileCredentialSource::open(&path).unwrap();
    assert!(source.is_authenticated().unwrap());
    assert_eq!(source.token().unwrap().unwrap().as_str(), "abc");
}

#[tokio::test]
async fn save_notifies_auth_before_token() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileCredentialSource::open(dir.path().join("credentials.json")).unwrap();
    let (seen, _subscriptions) = record(&source);

    source.save("abc").unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Seen::Auth(true), Seen::Token]);
    assert_eq!(
        load(source.path()).unwrap().unwrap().token(),
        Some("abc")
    );
}

#[tokio::test]
async fn rotation_notifies_token_only() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileCredentialSource::open(dir.path().join("credentials.json")).unwrap();
    source.save("abc").unwrap();
    let (seen, _subscriptions) = record(&source);

    source.save("def").unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Seen::Token]);
    assert_eq!(source.token().unwrap().unwrap().as_str(), "def");
}

#[tokio::test]
async fn clear_signs_out() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileCredentialSource::open(dir.path().join("credentials.json")).unwrap();
    source.save("abc").unwrap();
    let (seen, _subscriptions) = record(&source);

    source.clear().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Seen::Auth(false), Seen::Token]);
    assert!(!source.is_authenticated().unwrap());
}

#[tokio::test]
async fn unchanged_file_does_not_notify() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileCredentialSource::open(dir.path().join("credentials.json")).unwrap();
    let (seen, _subscriptions) = record(&source);

    assert!(!source.refresh());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn picks_up_writes_from_another_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let source = FileCredentialSource::open(&path).unwrap();
    let (seen, _subscriptions) = record(&source);

    gqlink_file::save(&path, "elsewhere").unwrap();

    wait_until(|| source.is_authenticated().unwrap()).await;
    assert_eq!(source.token().unwrap().unwrap().as_str(), "elsewhere");
    assert_eq!(seen.lock().unwrap().first(), Some(&Seen::Auth(true)));
}

#[tokio::test]
async fn corrupt_file_keeps_previous_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let source = FileCredentialSource::open(&path).unwrap();
    source.save("abc").unwrap();

    std::fs::write(&path, "{not json").unwrap();

    assert!(!source.refresh());
    assert_eq!(source.token().unwrap().unwrap().as_str(), "abc");
}

#[test]
fn opens_without_a_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileCredentialSource::open(dir.path().join("credentials.json")).unwrap();
    source.save("abc").unwrap();
    assert!(source.is_authenticated().unwrap());
}

#[test]
fn concurrent_refreshes_notify_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let source = Arc::new(FileCredentialSource::open(&path).unwrap());
    let (seen, _subscriptions) = record(&source);
    let done = Arc::new(AtomicBool::new(false));

    let refreshers: Vec<_> = (0..4)
        .map(|_| {
            let source = source.clone();
            let done = done.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    source.refresh();
                }
            })
        })
        .collect();

    for i in 0..50 {
        if i % 2 == 0 {
            gqlink_file::save(&path, "abc").unwrap();
        } else {
            gqlink_file::clear(&path).unwrap();
        }
        thread::sleep(Duration::from_millis(1));
    }
    gqlink_file::save(&path, "final").unwrap();
    done.store(true, Ordering::SeqCst);

    for refresher in refreshers {
        refresher.join().unwrap();
    }
    source.refresh();

    let auth: Vec<bool> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|seen| match seen {
            Seen::Auth(signed_in) => Some(*signed_in),
            Seen::Token => None,
        })
        .collect();

    // Transitions alternate and the last one matches the source.
    assert!(auth.windows(2).all(|pair| pair[0] != pair[1]));
    assert_eq!(auth.last().copied(), Some(true));
    assert_eq!(source.token().unwrap().unwrap().as_str(), "final");
}
