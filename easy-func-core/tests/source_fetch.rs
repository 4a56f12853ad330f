use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use easy_func_core::contract::{
    AccessToken, DeploymentTarget, EntryKind, MockSourceControlClient, Provider, RepoEntry,
};
use easy_func_core::error::DeployError;
use easy_func_core::source::list_source_files;

fn target(provider: Provider) -> DeploymentTarget {
    DeploymentTarget {
        provider,
        owner: "acme".into(),
        repository: "functions".into(),
        branch: "main".into(),
        source_dir: "src/functions".into(),
    }
}

fn entry(path: &str, kind: EntryKind) -> RepoEntry {
    RepoEntry {
        path: path.into(),
        kind,
        download_url: Some(format!("https://raw.example.com/{path}")),
    }
}

fn mixed_listing() -> Vec<RepoEntry> {
    vec![
        entry("src/functions/hello.py", EntryKind::File),
        entry("src/functions/README.md", EntryKind::File),
        entry("src/functions/lib", EntryKind::Directory),
        entry("src/functions/v2/goodbye.py", EntryKind::File),
        entry("src/functions/link.py", EntryKind::Other),
    ]
}

#[tokio::test]
async fn only_python_files_are_fetched_for_every_provider() {
    for provider in [Provider::GitHub, Provider::GitLab, Provider::Bitbucket] {
        let mut client = MockSourceControlClient::new();
        client
            .expect_list_directory()
            .times(1)
            .returning(|_, _| Ok(mixed_listing()));
        client
            .expect_fetch_raw()
            .times(2)
            .returning(|_, entry, _| Ok(format!("# {}\ndef handler(request):\n    pass\n", entry.path)));

        let files = list_source_files(&client, &target(provider), &AccessToken::new("t"))
            .await
            .expect("listing should succeed");

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/functions/hello.py", "src/functions/v2/goodbye.py"], "{provider}");
        assert!(files[0].content.starts_with("# src/functions/hello.py"));
    }
}

#[tokio::test]
async fn one_failed_fetch_fails_the_whole_listing() {
    let mut client = MockSourceControlClient::new();
    client
        .expect_list_directory()
        .returning(|_, _| Ok(mixed_listing()));
    client.expect_fetch_raw().returning(|_, entry, _| {
        if entry.path.ends_with("goodbye.py") {
            Err(DeployError::NotFound {
                provider: Provider::GitHub,
                message: "404 Not Found".into(),
            })
        } else {
            Ok("def hello(request):\n    pass\n".into())
        }
    });

    let result = list_source_files(&client, &target(Provider::GitHub), &AccessToken::new("t")).await;
    assert!(matches!(result, Err(DeployError::NotFound { .. })));
}

#[tokio::test]
async fn empty_directory_yields_no_files() {
    let mut client = MockSourceControlClient::new();
    client.expect_list_directory().returning(|_, _| Ok(vec![]));
    client.expect_fetch_raw().times(0);

    let files = list_source_files(&client, &target(Provider::GitLab), &AccessToken::new("t"))
        .await
        .unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn missing_token_never_reaches_the_provider() {
    let mut client = MockSourceControlClient::new();
    client.expect_list_directory().times(0);

    let result = list_source_files(&client, &target(Provider::Bitbucket), &AccessToken::new("")).await;
    assert!(matches!(
        result,
        Err(DeployError::Auth { provider: Provider::Bitbucket, .. })
    ));
}

#[tokio::test]
async fn listing_error_is_propagated_unchanged() {
    let mut client = MockSourceControlClient::new();
    client.expect_list_directory().returning(|_, _| {
        Err(DeployError::Auth {
            provider: Provider::GitHub,
            message: "401 Unauthorized: Bad credentials".into(),
        })
    });
    client.expect_fetch_raw().times(0);

    let result = list_source_files(&client, &target(Provider::GitHub), &AccessToken::new("expired")).await;
    match result {
        Err(DeployError::Auth { message, .. }) => assert!(message.contains("Bad credentials")),
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn fetches_receive_target_and_token() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let mut client = MockSourceControlClient::new();
    client
        .expect_list_directory()
        .withf(|t, token| t.branch == "main" && token.secret() == "secret")
        .returning(|_, _| Ok(vec![entry("src/functions/hello.py", EntryKind::File)]));
    client
        .expect_fetch_raw()
        .withf(|t, e, token| t.repository == "functions" && e.path == "src/functions/hello.py" && token.secret() == "secret")
        .returning(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(String::new())
        });

    let files = list_source_files(&client, &target(Provider::GitHub), &AccessToken::new("secret"))
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
