// src/services/mod.rs

//! Engines invoked by the HTTP handlers. They hold no state of their own;
//! the document store is the single source of truth.

pub mod authoring;
pub mod cascade;
pub mod classes;
pub mod grading;
pub mod invites;
pub mod membership;
pub mod quiz;
pub mod users;

use std::{sync::Arc, time::Duration};

use crate::{config::Config, store::{DocumentStore, TxRunner}};

use self::{
    authoring::Authoring, classes::ClassDirectory, invites::InviteResolver, membership::MembershipEngine,
    quiz::QuizEngine, users::UserDirectory,
};

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub membership: MembershipEngine,
    pub invites: InviteResolver,
    pub classes: ClassDirectory,
    pub authoring: Authoring,
    pub quiz: QuizEngine,
    pub users: UserDirectory,
}

impl Services {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        let runner = TxRunner::new(
            store.clone(),
            config.tx_max_attempts,
            Duration::from_millis(config.tx_backoff_ms),
        );
        let membership = MembershipEngine::new(runner.clone());
        let invites = InviteResolver::new(runner.clone(), membership.clone());

        Self {
            classes: ClassDirectory::new(store.clone()),
            authoring: Authoring::new(runner.clone()),
            quiz: QuizEngine::new(runner.clone()),
            users: UserDirectory::new(runner, invites.clone()),
            membership,
            invites,
            store,
        }
    }
}
