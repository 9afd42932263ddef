//! SysinfoReaper - sysinfo でプロセスツリーを列挙して kill する

use std::collections::{HashMap, VecDeque};

use sysinfo::{Pid, System};
use tracing::{debug, warn};

use crate::ports::{ProcessReaper, ReapScope};

#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoReaper;

impl SysinfoReaper {
    pub fn new() -> Self {
        Self
    }
}

/// Descendants of `root`, parents before children.
fn descendants(sys: &System, root: Pid) -> Vec<Pid> {
    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut out = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        for child in children.get(&pid).into_iter().flatten() {
            if *child != root && !out.contains(child) {
                out.push(*child);
                queue.push_back(*child);
            }
        }
    }
    out
}

impl ProcessReaper for SysinfoReaper {
    fn kill_tree(&self, pid: u32, scope: ReapScope) -> bool {
        let sys = System::new_all();
        let root = Pid::from_u32(pid);

        let mut targets = descendants(&sys, root);
        // 子から先に kill する
        targets.reverse();
        if scope == ReapScope::WithRoot {
            targets.push(root);
        }

        let mut all_ok = true;
        for target in targets {
            match sys.process(target) {
                Some(process) => {
                    if process.kill() {
                        debug!(target: "shuttle.reaper", pid = target.as_u32(), "killed");
                    } else {
                        warn!(target: "shuttle.reaper", pid = target.as_u32(), "kill failed");
                        all_ok = false;
                    }
                }
                None if target == root => {
                    debug!(target: "shuttle.reaper", pid, "root already exited");
                }
                None => {}
            }
        }
        all_ok
    }
}
