//! Keyboard input path.
//!
//! Raw set-1 scan codes arrive from the external ISR; `pc_keyboard` turns
//! them into key events. Printable keys echo on the displayed terminal and
//! land in its line buffer. Enter completes the line, Ctrl+L clears the
//! screen, and Alt+F1..F3 request a foreground switch.

use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, Keyboard, ScancodeSet1};

use crate::context::{InterruptController, SavedContext, Transfer, KEYBOARD_IRQ};
use crate::paging::VideoTarget;
use crate::Kernel;

const ALT_DOWN: u8 = 0x38;
const ALT_UP: u8 = 0xB8;

/// What a scan code amounted to, if anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KbAction {
    Char(u8),
    Enter,
    Backspace,
    ClearScreen,
    Switch(usize),
}

pub struct Kb {
    decoder: Keyboard<layouts::Us104Key, ScancodeSet1>,
    alt: bool,
}

impl Kb {
    pub fn new() -> Self {
        Self {
            decoder: Keyboard::new(
                ScancodeSet1::new(),
                layouts::Us104Key,
                HandleControl::MapLettersToUnicode,
            ),
            alt: false,
        }
    }

    /// Fold one scan code into the decoder state.
    pub fn decode(&mut self, scancode: u8) -> Option<KbAction> {
        // alt is tracked from the raw stream so Alt+Fn works regardless of
        // what the layout makes of the modifier
        match scancode {
            ALT_DOWN => {
                self.alt = true;
                return None;
            }
            ALT_UP => {
                self.alt = false;
                return None;
            }
            _ => {}
        }

        let event = self.decoder.add_byte(scancode).ok().flatten()?;
        let key = self.decoder.process_keyevent(event)?;
        match key {
            DecodedKey::RawKey(KeyCode::F1) if self.alt => Some(KbAction::Switch(0)),
            DecodedKey::RawKey(KeyCode::F2) if self.alt => Some(KbAction::Switch(1)),
            DecodedKey::RawKey(KeyCode::F3) if self.alt => Some(KbAction::Switch(2)),
            DecodedKey::Unicode(c) => match c {
                '\n' | '\r' => Some(KbAction::Enter),
                '\u{8}' => Some(KbAction::Backspace),
                '\u{c}' => Some(KbAction::ClearScreen), // Ctrl+L
                c if (' '..='~').contains(&c) => Some(KbAction::Char(c as u8)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Kernel<'_> {
    /// Keyboard interrupt entry point. Mutates the displayed terminal's
    /// input state; a foreground-switch chord resolves to that switch's
    /// transfer. The IRQ is acknowledged before any transfer is returned.
    pub fn key_event(
        &mut self,
        scancode: u8,
        current: SavedContext,
        pic: &mut dyn InterruptController,
    ) -> Transfer {
        let action = self.kb.decode(scancode);
        pic.end_of_interrupt(KEYBOARD_IRQ);

        let displayed = self.terminals.displayed;
        match action {
            Some(KbAction::Switch(target)) => self.switch_foreground(target, current),
            Some(KbAction::Char(c)) => {
                let Kernel { video, terminals, .. } = self;
                let term = terminals.term_mut(displayed);
                if term.input.push(c) {
                    video.page_mut(VideoTarget::Live).put_char(&mut term.cursor, c);
                }
                Transfer::Stay
            }
            Some(KbAction::Enter) => {
                let Kernel { video, terminals, .. } = self;
                let term = terminals.term_mut(displayed);
                term.input.finish();
                video.page_mut(VideoTarget::Live).newline(&mut term.cursor);
                Transfer::Stay
            }
            Some(KbAction::Backspace) => {
                let Kernel { video, terminals, .. } = self;
                let term = terminals.term_mut(displayed);
                // only typed input can be erased; prompts and program
                // output are not in the line buffer
                if term.input.backspace() {
                    video.page_mut(VideoTarget::Live).erase_last(&mut term.cursor);
                }
                Transfer::Stay
            }
            Some(KbAction::ClearScreen) => {
                let Kernel { video, terminals, .. } = self;
                let term = terminals.term_mut(displayed);
                video.page_mut(VideoTarget::Live).clear(&mut term.cursor);
                term.input.reset();
                Transfer::Stay
            }
            None => Transfer::Stay,
        }
    }

    /// RTC interrupt entry point.
    pub fn rtc_event(&mut self, pic: &mut dyn InterruptController) {
        self.rtc.tick();
        pic.end_of_interrupt(crate::context::RTC_IRQ);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(kb: &mut Kb, codes: &[u8]) -> Vec<KbAction> {
        codes.iter().filter_map(|&c| kb.decode(c)).collect()
    }

    #[test]
    fn letters_decode_to_chars() {
        let mut kb = Kb::new();
        // 'h' down/up, 'i' down/up
        let actions = press(&mut kb, &[0x23, 0xA3, 0x17, 0x97]);
        assert_eq!(actions, vec![KbAction::Char(b'h'), KbAction::Char(b'i')]);
    }

    #[test]
    fn enter_and_backspace() {
        let mut kb = Kb::new();
        let actions = press(&mut kb, &[0x0E, 0x8E, 0x1C, 0x9C]);
        assert_eq!(actions, vec![KbAction::Backspace, KbAction::Enter]);
    }

    #[test]
    fn alt_function_keys_switch_terminals() {
        let mut kb = Kb::new();
        // alt down, F2 down/up, alt up, then F2 alone
        let actions = press(&mut kb, &[ALT_DOWN, 0x3C, 0xBC, ALT_UP, 0x3C, 0xBC]);
        assert_eq!(actions, vec![KbAction::Switch(1)]);
    }

    #[test]
    fn ctrl_l_clears() {
        let mut kb = Kb::new();
        // ctrl down, 'l' down/up, ctrl up
        let actions = press(&mut kb, &[0x1D, 0x26, 0xA6, 0x9D]);
        assert_eq!(actions, vec![KbAction::ClearScreen]);
    }
}
