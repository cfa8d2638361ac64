//! What component glue needs from the transport
//!
//! [`Transport`] is the seam between the anonymous channel client and the
//! nub. The nub implements it against the process registry; tests implement
//! it with scripted answers.

use std::future::Future;

use super::address::Address;
use super::interface::InterfaceElement;
use super::reason::Reason;

pub trait Transport: Send + Sync {
    /// Address other processes reach this one at.
    fn address(&self) -> Address;

    /// Ask to be sent `birth` (carrying the newcomer's address) whenever a
    /// process registers under `component`.
    fn register_birth_listener(
        &self,
        birth: &InterfaceElement,
        component: &str,
    ) -> impl Future<Output = Result<(), Reason>> + Send;

    fn deregister_birth_listener(
        &self,
        birth: &InterfaceElement,
        component: &str,
    ) -> impl Future<Output = Result<(), Reason>> + Send;

    /// Ask to be sent `death` whenever a process under `component` goes away.
    fn register_death_listener(
        &self,
        death: &InterfaceElement,
        component: &str,
    ) -> impl Future<Output = Result<(), Reason>> + Send;

    fn deregister_death_listener(
        &self,
        death: &InterfaceElement,
        component: &str,
    ) -> impl Future<Output = Result<(), Reason>> + Send;

    /// Look up a running instance of `component`. `index < 0` accepts any
    /// instance. Makes up to `retries` attempts (always at least one).
    fn find_interface(
        &self,
        component: &str,
        index: i32,
        retries: u32,
    ) -> impl Future<Output = Result<Address, Reason>> + Send;
}
