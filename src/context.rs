// context.rs — Explicit accelerator-context handle.
//
// The graphics context and its resources (device textures, compiled
// programs) are owned by an external resource manager; this crate only
// holds a handle. The handle carries a generation counter: every program
// records the generation it was built against, and `invalidate()` bumps
// the counter to model a device loss. After a loss the owner re-invokes
// program construction with the retained kernel parameters — host-side
// state (sensitivity, expected count, thresholds) survives untouched.
//
// There is deliberately no ambient/global context: every program
// constructor and pipeline call takes `&Context` explicitly.

/// Handle to the accelerator context.
#[derive(Debug)]
pub struct Context {
    generation: u64,
}

impl Context {
    pub fn new() -> Self {
        Context { generation: 0 }
    }

    /// The current context generation. Programs built against an older
    /// generation are stale and must be rebuilt before use.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Invalidate the context, as the resource manager does on device
    /// loss. All programs built before this call become stale.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        log::debug!("context invalidated (generation {})", self.generation);
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_advances_on_invalidate() {
        let mut ctx = Context::new();
        assert_eq!(ctx.generation(), 0);
        ctx.invalidate();
        ctx.invalidate();
        assert_eq!(ctx.generation(), 2);
    }
}
