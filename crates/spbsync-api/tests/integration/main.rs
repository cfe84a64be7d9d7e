//! Integration tests for spbsync-api
//!
//! Uses wiremock to simulate the SPB service and verifies end-to-end
//! behavior of the adjust submission, the processed check, the SPB list
//! and the reachability probe.

mod common;

mod test_probe;
mod test_spb_list;
mod test_submission;
