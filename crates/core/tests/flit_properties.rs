// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use fabriclink_core::net::{split_frame, FrameAssembler, FLIT_BYTES};
use fabriclink_core::{Flit, ProtocolError};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_frames_survive_the_register_encoding(
        frame in prop::collection::vec(any::<u8>(), 1..300)
    ) {
        let flits = split_frame(&frame);
        prop_assert_eq!(flits.len(), frame.len().div_ceil(FLIT_BYTES));

        let mut assembler = FrameAssembler::new();
        let mut frames = Vec::new();
        for flit in &flits {
            let [lo, hi, ctrl] = flit.to_words();
            let decoded = Flit::from_words(lo, hi, ctrl).unwrap();
            prop_assert_eq!(decoded.payload(), flit.payload());
            if let Some(done) = assembler.push(&decoded) {
                frames.push(done);
            }
        }

        prop_assert_eq!(frames, vec![frame]);
        prop_assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_control_word_validation(keep in any::<u8>(), more in any::<bool>()) {
        let ctrl = ((keep as u32) << 8) | more as u32;
        let contiguous = keep != 0 && keep.trailing_ones() + keep.leading_zeros() == 8;
        let valid = contiguous && (!more || keep == 0xFF);

        match Flit::from_words(0, 0, ctrl) {
            Ok(flit) => {
                prop_assert!(valid);
                prop_assert_eq!(flit.keep, keep);
                prop_assert_eq!(flit.more, more);
            }
            Err(e) => {
                prop_assert!(!valid);
                prop_assert_eq!(e, ProtocolError::InvalidFlit(ctrl));
            }
        }
    }
}
