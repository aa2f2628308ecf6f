use crate::protocol::ReasonCode;

/// A single handshake or pipeline check: inspects the packet, may
/// update state, and yields the reason code that refuses the packet.
pub type CheckFn<P, S> = fn(&P, &mut S) -> Result<(), ReasonCode>;

/// Fold a packet through an ordered check chain, stopping at the first
/// refusal.
pub fn run_checks<P, S>(
    checks: &[CheckFn<P, S>],
    packet: &P,
    state: &mut S,
) -> Result<(), ReasonCode> {
    for check in checks {
        check(packet, state)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(_: &u8, _: &mut u8) -> Result<(), ReasonCode> {
        Ok(())
    }

    fn count(_: &u8, state: &mut u8) -> Result<(), ReasonCode> {
        *state += 1;
        Ok(())
    }

    fn refuse(_: &u8, _: &mut u8) -> Result<(), ReasonCode> {
        Err(ReasonCode::NotAuthorized)
    }

    #[test]
    fn chain_runs_in_order_until_refusal() {
        let mut state = 0u8;
        assert!(run_checks(&[pass, count, count], &0, &mut state).is_ok());
        assert_eq!(state, 2);

        let mut state = 0u8;
        let err = run_checks(&[count, refuse, count], &0, &mut state).unwrap_err();
        assert_eq!(err, ReasonCode::NotAuthorized);
        assert_eq!(state, 1);
    }
}
