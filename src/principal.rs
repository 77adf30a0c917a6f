// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Authenticated principals and capability tokens.
//!
//! Request routing and session resolution live outside this crate. The
//! dispatcher resolves an authenticated [`Principal`] once, converts it to a
//! typed capability where an operation needs elevated rights, and hands that
//! token to the core. Core operations never re-derive permissions from roles;
//! the only checks they keep are data-model ownership invariants.

use crate::base::UserId;
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

/// Role resolved by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Principal { user_id, role }
    }

    /// Grants the admin capability. Super-admins hold it implicitly.
    pub fn admin(&self) -> Result<Admin<'_>, LedgerError> {
        match self.role {
            Role::Admin | Role::SuperAdmin => Ok(Admin { principal: self }),
            Role::User => Err(LedgerError::Forbidden),
        }
    }

    /// Grants the super-admin capability.
    pub fn super_admin(&self) -> Result<SuperAdmin<'_>, LedgerError> {
        match self.role {
            Role::SuperAdmin => Ok(SuperAdmin { principal: self }),
            Role::User | Role::Admin => Err(LedgerError::Forbidden),
        }
    }
}

/// Proof that the holder was resolved as an admin before entering the core.
#[derive(Debug, Clone, Copy)]
pub struct Admin<'a> {
    principal: &'a Principal,
}

impl<'a> Admin<'a> {
    pub fn principal(&self) -> &'a Principal {
        self.principal
    }
}

/// Proof that the holder was resolved as a super-admin.
#[derive(Debug, Clone, Copy)]
pub struct SuperAdmin<'a> {
    principal: &'a Principal,
}

impl<'a> SuperAdmin<'a> {
    pub fn principal(&self) -> &'a Principal {
        self.principal
    }

    /// Every super-admin capability carries the admin capability.
    pub fn admin(&self) -> Admin<'a> {
        Admin {
            principal: self.principal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_role_gets_no_capability() {
        let principal = Principal::new(UserId(1), Role::User);
        assert_eq!(principal.admin().err(), Some(LedgerError::Forbidden));
        assert_eq!(principal.super_admin().err(), Some(LedgerError::Forbidden));
    }

    #[test]
    fn admin_role_is_not_super_admin() {
        let principal = Principal::new(UserId(1), Role::Admin);
        assert!(principal.admin().is_ok());
        assert_eq!(principal.super_admin().err(), Some(LedgerError::Forbidden));
    }

    #[test]
    fn super_admin_holds_both_capabilities() {
        let principal = Principal::new(UserId(1), Role::SuperAdmin);
        assert!(principal.admin().is_ok());
        let token = principal.super_admin().unwrap();
        assert_eq!(token.admin().principal().user_id, UserId(1));
    }
}
