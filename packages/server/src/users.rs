//! The user store and session set (spec §4.7): persistent accounts keyed
//! by hashed username, plus an in-memory `LoginSet` whose lifecycle is the
//! process itself.

use std::collections::HashMap;
use std::path::Path;

use ticket_storage::{BPlusTree, Result};

use crate::model::{hash_key, MailAddr, PersonName, Password, User, Username};

/// In-memory map of currently logged-in usernames to their privilege at
/// login time (spec §3: "LoginSet"). Never persisted.
#[derive(Default)]
pub struct LoginSet {
    privileges: HashMap<String, u8>,
}

impl LoginSet {
    pub fn is_logged_in(&self, username: &str) -> bool {
        self.privileges.contains_key(username)
    }

    pub fn privilege_of(&self, username: &str) -> Option<u8> {
        self.privileges.get(username).copied()
    }

    fn log_in(&mut self, username: &str, privilege: u8) {
        self.privileges.insert(username.to_string(), privilege);
    }

    fn log_out(&mut self, username: &str) -> bool {
        self.privileges.remove(username).is_some()
    }

    /// Keeps a logged-in user's recorded privilege in sync after they
    /// modify their own profile.
    fn update_privilege(&mut self, username: &str, privilege: u8) {
        if let Some(p) = self.privileges.get_mut(username) {
            *p = privilege;
        }
    }
}

/// Fields a profile modification may change; `None` leaves the field
/// untouched (spec §4.7: "apply only provided fields").
#[derive(Default)]
pub struct ProfilePatch {
    pub password: Option<Password>,
    pub name: Option<PersonName>,
    pub mail_addr: Option<MailAddr>,
    pub privilege: Option<u8>,
}

pub struct UserStore {
    tree: BPlusTree<u64, User>,
}

impl UserStore {
    pub fn open(dir: impl AsRef<Path>, index_cap: usize, leaf_cap: usize) -> Result<Self> {
        Ok(Self {
            tree: BPlusTree::open(dir, "user", index_cap, leaf_cap)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tree.empty()
    }

    pub fn get(&mut self, username: &str) -> Result<Option<User>> {
        let key = hash_key(username);
        Ok(self
            .tree
            .find(&key)?
            .into_iter()
            .find(|u| u.username.as_str() == username))
    }

    /// The first-ever user bypasses every requester check and is forced
    /// to privilege 10 (spec §4.7). Every subsequent add requires `cur`
    /// to be logged in, the target username to be free, and
    /// `cur.privilege > requested_privilege`.
    pub fn add(
        &mut self,
        cur: Option<&str>,
        logins: &LoginSet,
        username: Username,
        password: Password,
        name: PersonName,
        mail_addr: MailAddr,
        requested_privilege: u8,
    ) -> Result<bool> {
        if self.is_empty() {
            let user = User {
                username,
                password,
                name,
                mail_addr,
                privilege: 10,
            };
            self.tree.insert(hash_key(username.as_str()), user)?;
            return Ok(true);
        }

        let Some(cur) = cur else { return Ok(false) };
        let Some(cur_privilege) = logins.privilege_of(cur) else {
            return Ok(false);
        };
        if self.get(username.as_str())?.is_some() {
            return Ok(false);
        }
        if cur_privilege <= requested_privilege {
            return Ok(false);
        }

        let user = User {
            username,
            password,
            name,
            mail_addr,
            privilege: requested_privilege,
        };
        self.tree.insert(hash_key(username.as_str()), user)?;
        Ok(true)
    }

    pub fn login(&mut self, logins: &mut LoginSet, username: &str, password: &str) -> Result<bool> {
        if logins.is_logged_in(username) {
            return Ok(false);
        }
        let Some(user) = self.get(username)? else {
            return Ok(false);
        };
        if user.password.as_str() != password {
            return Ok(false);
        }
        logins.log_in(username, user.privilege);
        Ok(true)
    }

    pub fn logout(&self, logins: &mut LoginSet, username: &str) -> bool {
        logins.log_out(username)
    }

    /// `cur` must be logged in, and either outrank `target` or be
    /// querying themself.
    pub fn query_profile(
        &mut self,
        logins: &LoginSet,
        cur: &str,
        target: &str,
    ) -> Result<Option<User>> {
        let Some(cur_privilege) = logins.privilege_of(cur) else {
            return Ok(None);
        };
        let Some(user) = self.get(target)? else {
            return Ok(None);
        };
        if cur == target || cur_privilege > user.privilege {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    /// Applies `patch`'s present fields to `target`'s profile. Requires
    /// `cur` logged in, outranking the patch's requested privilege
    /// ceiling (when given) and either outranking `target` or being
    /// `target` themself. Returns the updated profile on success.
    pub fn modify_profile(
        &mut self,
        logins: &mut LoginSet,
        cur: &str,
        target: &str,
        patch: ProfilePatch,
    ) -> Result<Option<User>> {
        let Some(cur_privilege) = logins.privilege_of(cur) else {
            return Ok(None);
        };
        let Some(old) = self.get(target)? else {
            return Ok(None);
        };
        if let Some(requested) = patch.privilege {
            if cur_privilege <= requested {
                return Ok(None);
            }
        }
        if !(cur == target || cur_privilege > old.privilege) {
            return Ok(None);
        }

        let mut new = old;
        if let Some(p) = patch.password {
            new.password = p;
        }
        if let Some(n) = patch.name {
            new.name = n;
        }
        if let Some(m) = patch.mail_addr {
            new.mail_addr = m;
        }
        if let Some(p) = patch.privilege {
            new.privilege = p;
        }

        self.tree.update(hash_key(target), new, old)?;
        if cur == target {
            logins.update_privilege(target, new.privilege);
        }
        Ok(Some(new))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.tree.flush()
    }
}
