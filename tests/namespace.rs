use std::path::Path;

use justice::{is_isolated, isolate_root, JusticeError, NamespaceContext};

mod common;

// One test per binary: the isolation flag is process-wide.
#[test]
fn it_should_isolate_at_most_once() {
  common::setup();
  let context = unsafe { NamespaceContext::assume_entered() };

  let first = isolate_root(&context, Path::new("relative/rootfs"));
  assert!(matches!(first, Err(JusticeError::InvalidRoot(_))));
  assert!(is_isolated());

  let second = isolate_root(&context, Path::new("/srv/rootfs"));
  assert!(matches!(second, Err(JusticeError::AlreadyIsolated)));
}
