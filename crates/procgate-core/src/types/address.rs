//! Memory address types.
//!
//! Two address spaces meet in every memory command: the target's (where bytes
//! are read or written) and the caller's (where the data buffer lives). Each
//! gets its own newtype so one can never be passed where the other is meant.

use std::fmt;
use std::ops::Add;

/// Virtual address inside the target process
///
/// ## Example
///
/// ```rust
/// use procgate_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x100;
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// ```rust
    /// use procgate_core::types::Address;
    ///
    /// const STACK_BASE: Address = Address::new(0x7fff00000000);
    /// ```
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use procgate_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Offset of `self` from `base`, if `self` is not below it.
    #[must_use]
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

/// Pointer into the caller's address space
///
/// Never dereferenced directly; it is only handed to
/// [`UserMemory`](crate::host::UserMemory), which performs checked copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserPtr(u64);

impl UserPtr
{
    /// The null pointer
    pub const NULL: Self = UserPtr(0);

    /// Wrap a raw caller-space pointer value.
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        UserPtr(value)
    }

    /// Raw pointer value.
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// `true` for the null pointer.
    #[must_use]
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Pointer `offset` bytes further on, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(UserPtr)
    }
}

impl From<u64> for UserPtr
{
    fn from(value: u64) -> Self
    {
        UserPtr(value)
    }
}

impl fmt::Display for UserPtr
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}
