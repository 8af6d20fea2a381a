use aya::{
    Ebpf,
    maps::ProgramArray,
    programs::{Link, Xdp, XdpFlags, xdp::XdpLink},
};
use domain::common::error::DomainError;
use ebpf_common::programs::{ALL_PROGRAMS, MAP_CALLS, PROG_ENTRYPOINT, TAIL_CALLS};
use ports::secondary::xdp_attach_port::{XdpAttachPort, XdpAttachment};
use tracing::{info, warn};

/// Loads the xdplb object and manages its XDP programs.
///
/// Owns the `aya::Ebpf` instance. Map managers take their maps out of it
/// through [`ebpf_mut`](Self::ebpf_mut); the programs stay here so the
/// loader can attach `entrypoint` to new devices at runtime. Dropping the
/// loader unloads every program.
pub struct EbpfLoader {
    ebpf: Ebpf,
}

impl EbpfLoader {
    /// Load the object from raw ELF bytes.
    ///
    /// Initializes aya-log for eBPF debug message forwarding (best-effort).
    pub fn load(program_bytes: &[u8]) -> Result<Self, anyhow::Error> {
        let mut ebpf = Ebpf::load(program_bytes)?;

        if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
            warn!("eBPF logger init failed (non-fatal): {e}");
        }

        info!("eBPF object loaded");
        Ok(Self { ebpf })
    }

    /// Load every XDP program of the object into the kernel.
    pub fn load_programs(&mut self) -> Result<(), anyhow::Error> {
        for name in ALL_PROGRAMS {
            let program: &mut Xdp = self
                .ebpf
                .program_mut(name)
                .ok_or_else(|| anyhow::anyhow!("program '{name}' not found in eBPF object"))?
                .try_into()?;
            program.load()?;
            info!(program = name, "XDP program loaded");
        }
        Ok(())
    }

    /// Populate `calls_map` with the tail-call targets of `entrypoint`.
    ///
    /// Must run after [`load_programs`](Self::load_programs).
    pub fn register_tail_calls(&mut self) -> Result<(), anyhow::Error> {
        let map = self
            .ebpf
            .take_map(MAP_CALLS)
            .ok_or_else(|| anyhow::anyhow!("map '{MAP_CALLS}' not found in eBPF object"))?;
        let mut calls = ProgramArray::try_from(map)?;

        for (index, name) in TAIL_CALLS {
            let program: &Xdp = self
                .ebpf
                .program(name)
                .ok_or_else(|| anyhow::anyhow!("program '{name}' not found in eBPF object"))?
                .try_into()?;
            let fd = program
                .fd()
                .map_err(|e| anyhow::anyhow!("program '{name}' fd unavailable: {e}"))?;
            calls.set(index, fd, 0)?;
            info!(index, program = name, "tail-call target registered");
        }
        Ok(())
    }

    /// Attach `entrypoint` to the device at `ifindex` in SKB mode.
    pub fn attach(&mut self, ifindex: u32) -> Result<XdpLinkAttachment, anyhow::Error> {
        let program: &mut Xdp = self
            .ebpf
            .program_mut(PROG_ENTRYPOINT)
            .ok_or_else(|| anyhow::anyhow!("program '{PROG_ENTRYPOINT}' not found in eBPF object"))?
            .try_into()?;

        let link_id = program.attach_to_if_index(ifindex, XdpFlags::SKB_MODE)?;
        let link = program.take_link(link_id)?;
        info!(ifindex, "entrypoint attached");
        Ok(XdpLinkAttachment { ifindex, link })
    }

    /// Borrow the inner `Ebpf` instance mutably.
    ///
    /// Used by map managers to take their maps.
    pub fn ebpf_mut(&mut self) -> &mut Ebpf {
        &mut self.ebpf
    }
}

impl XdpAttachPort for EbpfLoader {
    fn attach_entrypoint(&mut self, ifindex: u32) -> Result<Box<dyn XdpAttachment>, DomainError> {
        self.attach(ifindex)
            .map(|a| Box::new(a) as Box<dyn XdpAttachment>)
            .map_err(|e| DomainError::EngineError(format!("xdp attach to ifindex {ifindex} failed: {e}")))
    }
}

/// An owned `entrypoint` link on one device.
pub struct XdpLinkAttachment {
    ifindex: u32,
    link: XdpLink,
}

impl XdpLinkAttachment {
    pub fn detach_link(self) -> Result<(), anyhow::Error> {
        let ifindex = self.ifindex;
        self.link.detach()?;
        info!(ifindex, "entrypoint detached");
        Ok(())
    }
}

impl XdpAttachment for XdpLinkAttachment {
    fn ifindex(&self) -> u32 {
        self.ifindex
    }

    fn detach(self: Box<Self>) -> Result<(), DomainError> {
        let ifindex = self.ifindex;
        self.detach_link()
            .map_err(|e| DomainError::EngineError(format!("xdp detach from ifindex {ifindex} failed: {e}")))
    }
}
