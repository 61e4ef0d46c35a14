//! Client-side state machine for one authorization attempt.
//!
//! `Requested -> Challenged -> Signed -> Verified | Rejected`. Any step may
//! also move to `Rejected`; nothing leaves a terminal state.

use crate::challenge::Challenge;
use crate::errors::*;
use crate::proof::AuthorizationProof;
use crate::signer::WalletSigner;
use filechain_types::OwnerId;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Requested,
    Challenged,
    Signed,
    Verified,
    Rejected,
}

impl AuthState {
    fn can_move_to(self, next: AuthState) -> bool {
        use AuthState::*;
        matches!(
            (self, next),
            (Requested, Challenged)
                | (Challenged, Signed)
                | (Signed, Verified)
                | (Requested | Challenged | Signed, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AuthState::Verified | AuthState::Rejected)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthState::Requested => "requested",
            AuthState::Challenged => "challenged",
            AuthState::Signed => "signed",
            AuthState::Verified => "verified",
            AuthState::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// Tracks one pass through the challenge-response exchange for `owner`.
#[derive(Debug)]
pub struct AuthorizationAttempt {
    owner: OwnerId,
    state: AuthState,
    challenge: Option<Challenge>,
}

impl AuthorizationAttempt {
    pub fn request(owner: OwnerId) -> Self {
        debug!(owner = %owner, "authorization requested");
        Self {
            owner,
            state: AuthState::Requested,
            challenge: None,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    fn advance(&mut self, next: AuthState) -> Result<()> {
        if !self.state.can_move_to(next) {
            return Err(AuthError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(owner = %self.owner, from = %self.state, to = %next, "authorization transition");
        self.state = next;
        Ok(())
    }

    /// Accept the challenge issued by the verifier. It must be bound to the
    /// owner this attempt was requested for.
    pub fn receive_challenge(&mut self, challenge: Challenge) -> Result<()> {
        if challenge.owner != self.owner {
            let err = AuthError::OwnerMismatch {
                expected: self.owner.to_address(),
                claimed: challenge.owner.to_address(),
            };
            self.reject();
            return Err(err);
        }
        self.advance(AuthState::Challenged)?;
        self.challenge = Some(challenge);
        Ok(())
    }

    /// Have `signer` sign the unmodified challenge bytes.
    pub async fn sign<W>(&mut self, signer: &W) -> Result<AuthorizationProof>
    where
        W: WalletSigner + ?Sized,
    {
        if self.state != AuthState::Challenged {
            return Err(AuthError::InvalidTransition {
                from: self.state.to_string(),
                to: AuthState::Signed.to_string(),
            });
        }
        let Some(challenge) = self.challenge.take() else {
            return Err(AuthError::UnknownChallenge);
        };

        if signer.address() != self.owner {
            self.reject();
            return Err(AuthError::OwnerMismatch {
                expected: self.owner.to_address(),
                claimed: signer.address().to_address(),
            });
        }

        let signature = match signer.sign_message(&challenge.message()).await {
            Ok(signature) => signature,
            Err(e) => {
                self.reject();
                return Err(e);
            }
        };

        self.advance(AuthState::Signed)?;
        Ok(AuthorizationProof::new(self.owner, challenge, signature))
    }

    /// Record the verifier's decision.
    pub fn conclude(&mut self, accepted: bool) -> Result<()> {
        if accepted {
            self.advance(AuthState::Verified)
        } else {
            self.advance(AuthState::Rejected)
        }
    }

    pub fn reject(&mut self) {
        if !self.state.is_terminal() {
            debug!(owner = %self.owner, from = %self.state, "authorization rejected");
            self.state = AuthState::Rejected;
        }
    }
}

/// Drive a fresh attempt for `signer` through the challenge it was issued.
///
/// Returns the attempt in the `Signed` state so the caller can record the
/// verifier's decision with [`AuthorizationAttempt::conclude`].
pub async fn authorize<W>(
    signer: &W,
    challenge: Challenge,
) -> Result<(AuthorizationAttempt, AuthorizationProof)>
where
    W: WalletSigner + ?Sized,
{
    let mut attempt = AuthorizationAttempt::request(signer.address());
    attempt.receive_challenge(challenge)?;
    let proof = attempt.sign(signer).await?;
    Ok((attempt, proof))
}
