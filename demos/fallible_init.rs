use std::sync::atomic::{AtomicBool, Ordering};

use lazy_singleton::{HolderState, SingletonError, TryLazy};

static FAIL_NEXT: AtomicBool = AtomicBool::new(true);

static SETTINGS: TryLazy<String, &'static str> = TryLazy::new(|| {
   let fail = FAIL_NEXT.swap(false, Ordering::Relaxed);
   println!("Attempting construction (fail={fail})...");
   if fail {
      Err("settings file unavailable")
   } else {
      Ok("Successfully constructed".to_string())
   }
});

fn main() {
   // First attempt fails and leaves the singleton absent
   match SETTINGS.get_instance() {
      Ok(_) => panic!("Should have failed"),
      Err(SingletonError::ConstructionFailed(e)) => println!("Caught error: {e}"),
      Err(e) => panic!("Unexpected error: {e}"),
   }
   assert_eq!(SETTINGS.state(), HolderState::Absent);

   // Second attempt succeeds
   let data = SETTINGS.get_instance().expect("retry should succeed");
   println!("Got data: {data}");
   assert_eq!(SETTINGS.state(), HolderState::Present);

   // Later calls return the same instance without constructing
   let again = SETTINGS.get_instance().expect("instance is present");
   assert!(std::ptr::eq(data, again));
}
