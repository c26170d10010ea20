//! Integration tests for repository reference parsing

use degit::{ParseError, Repo, Site, DEFAULT_REF};

#[test]
fn test_dotted_host_prefix() {
    let repo = Repo::parse("github.com/user/repo").unwrap();
    assert_eq!(repo.site, Site::GitHub);
    assert_eq!(repo.user, "user");
    assert_eq!(repo.name, "repo");
    assert_eq!(repo.reference, DEFAULT_REF);
    assert_eq!(repo.url, "https://github.com/user/repo");
    assert_eq!(repo.ssh, "git@github.com:user/repo");
}

#[test]
fn test_https_url_with_subdir_and_ref() {
    let repo = Repo::parse("https://gitlab.com/user/repo/subdir#branch").unwrap();
    assert_eq!(repo.site, Site::GitLab);
    assert_eq!(repo.subdir, "/subdir");
    assert_eq!(repo.reference, "branch");
    assert_eq!(repo.url, "https://gitlab.com/user/repo");
}

#[test]
fn test_unsupported_host_is_named() {
    let err = Repo::parse("https://example.com/user/repo").unwrap_err();
    assert_eq!(err, ParseError::UnsupportedHost("example".to_string()));
    assert!(err.to_string().contains("example"));
}

#[test]
fn test_all_input_forms_agree() {
    let forms = [
        "user/repo",
        "github:user/repo",
        "github.com/user/repo",
        "https://github.com/user/repo",
        "https://github.com/user/repo.git",
        "git@github.com:user/repo",
        "git@github.com:user/repo.git",
        "user/repo/",
    ];
    for form in forms {
        let repo = Repo::parse(form).unwrap_or_else(|e| panic!("{}: {}", form, e));
        assert_eq!(repo.url, "https://github.com/user/repo", "{}", form);
        assert!(repo.subdir.is_empty(), "{}", form);
    }
}

#[test]
fn test_sourcehut_and_bitbucket_domains() {
    let repo = Repo::parse("git.sr.ht/~user/repo").unwrap();
    assert_eq!(repo.site, Site::Sourcehut);
    assert_eq!(repo.url, "https://git.sr.ht/~user/repo");

    let repo = Repo::parse("bitbucket.org/user/repo").unwrap();
    assert_eq!(repo.site, Site::Bitbucket);
    assert_eq!(repo.ssh, "git@bitbucket.org:user/repo");
}
