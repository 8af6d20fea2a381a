use domain::common::error::DomainError;

/// A live attachment of the entrypoint program to one device.
pub trait XdpAttachment: Send + Sync {
    fn ifindex(&self) -> u32;

    /// Detach the program from the device.
    fn detach(self: Box<Self>) -> Result<(), DomainError>;
}

/// Secondary port for attaching the entrypoint program to backend devices.
///
/// Implemented by `EbpfLoader` in the adapter layer, which owns the loaded
/// programs.
pub trait XdpAttachPort: Send + Sync {
    /// Attach the entrypoint program to `ifindex` in generic (SKB) mode.
    fn attach_entrypoint(&mut self, ifindex: u32) -> Result<Box<dyn XdpAttachment>, DomainError>;
}
