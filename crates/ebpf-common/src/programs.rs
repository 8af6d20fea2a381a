//! Names of the programs and maps in the xdplb object, and the tail-call
//! dispatch indices the `entrypoint` program jumps through.

// ── Programs ─────────────────────────────────────────────────────────

pub const PROG_ENTRYPOINT: &str = "entrypoint";
pub const PROG_COUNT: &str = "count";
pub const PROG_FIREWALL: &str = "firewall";
pub const PROG_DOS_PROTECTOR: &str = "dos_protector";
pub const PROG_LB_INGRESS: &str = "lb_ingress";
pub const PROG_LB_EGRESS: &str = "lb_egress";

/// Every XDP program in the object, in load order.
pub const ALL_PROGRAMS: [&str; 6] = [
    PROG_ENTRYPOINT,
    PROG_COUNT,
    PROG_FIREWALL,
    PROG_DOS_PROTECTOR,
    PROG_LB_INGRESS,
    PROG_LB_EGRESS,
];

// ── Tail calls ───────────────────────────────────────────────────────

/// `ProgramArray` used by `entrypoint` to dispatch into feature programs.
pub const MAP_CALLS: &str = "calls_map";

pub const TAIL_CALL_COUNT: u32 = 0;
pub const TAIL_CALL_FIREWALL: u32 = 1;
pub const TAIL_CALL_DOS_PROTECTOR: u32 = 2;
pub const TAIL_CALL_LB_INGRESS: u32 = 3;
pub const TAIL_CALL_LB_EGRESS: u32 = 4;

/// `(index, program)` pairs written into `calls_map` at startup.
pub const TAIL_CALLS: [(u32, &str); 5] = [
    (TAIL_CALL_COUNT, PROG_COUNT),
    (TAIL_CALL_FIREWALL, PROG_FIREWALL),
    (TAIL_CALL_DOS_PROTECTOR, PROG_DOS_PROTECTOR),
    (TAIL_CALL_LB_INGRESS, PROG_LB_INGRESS),
    (TAIL_CALL_LB_EGRESS, PROG_LB_EGRESS),
];

// ── Maps ─────────────────────────────────────────────────────────────

pub const MAP_COUNTER: &str = "counter";
pub const MAP_RULES: &str = "rules";
pub const MAP_DROP_COUNTER: &str = "drop_counter";
pub const MAP_ADV_RULE_MATCHER: &str = "adv_rulematcher";
pub const MAP_ADV_RULES: &str = "adv_rules";
pub const MAP_DOSP_COUNTER: &str = "dosp_counter";
pub const MAP_REDIRECT_DEV: &str = "redirect_dev_map";
pub const MAP_BACKEND_INFO: &str = "backend_info";
pub const MAP_BACKEND_IFINDEX: &str = "backend_ifindex";
pub const MAP_UPSTREAM_INFO: &str = "upstream_info";
pub const MAP_CONNTRACK: &str = "conntrack";
pub const MAP_RR_TABLE: &str = "rr_table";
