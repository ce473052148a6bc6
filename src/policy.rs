//! Injected authorization policy for privileged users.

// self
use crate::{_prelude::*, auth::Profile};

/// Decides whether an authenticated user gets elevated claims.
pub trait AccessPolicy
where
	Self: Send + Sync,
{
	/// Returns `true` when `profile` should be marked privileged.
	fn is_privileged(&self, profile: &Profile) -> bool;
}

/// Grants privilege to an allow-list of logins (compared case-insensitively) or owner ids.
#[derive(Clone, Debug, Default)]
pub struct AllowListPolicy {
	logins: BTreeSet<String>,
}
impl AllowListPolicy {
	/// Builds the policy from configured usernames.
	pub fn new<I, S>(logins: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		Self {
			logins: logins
				.into_iter()
				.map(|s| s.as_ref().trim().to_ascii_lowercase())
				.filter(|s| !s.is_empty())
				.collect(),
		}
	}
}
impl AccessPolicy for AllowListPolicy {
	fn is_privileged(&self, profile: &Profile) -> bool {
		profile
			.login
			.iter()
			.map(String::as_str)
			.chain([profile.owner.as_str()])
			.any(|candidate| self.logins.contains(&candidate.to_ascii_lowercase()))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn matches_login_or_owner() {
		let policy = AllowListPolicy::new(["Octocat", " ", "1001"]);
		let octocat = Profile::from_userinfo(json!({ "id": 1, "login": "octocat" }), "id")
			.expect("Profile should parse.");
		let by_id = Profile::from_userinfo(json!({ "id": 1001 }), "id")
			.expect("Profile should parse.");
		let other = Profile::from_userinfo(json!({ "id": 2, "login": "hubot" }), "id")
			.expect("Profile should parse.");

		assert!(policy.is_privileged(&octocat));
		assert!(policy.is_privileged(&by_id));
		assert!(!policy.is_privileged(&other));
		assert!(!AllowListPolicy::default().is_privileged(&octocat));
	}
}
