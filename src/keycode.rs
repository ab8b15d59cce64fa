use serde::{Deserialize, Serialize};

/// Virtual key identities the engine can dispatch.
///
/// `code()` yields the platform virtual-key code the OS backend posts
/// (macOS `kVK_*` numbering, which the capture host uses as well).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VirtualKey {
    // Letters
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,

    // Digit row
    Num0,
    Num1,
    Num2,
    Num3,
    Num4,
    Num5,
    Num6,
    Num7,
    Num8,
    Num9,

    // Whitespace and editing
    Space,
    Return,
    Tab,
    Backspace,
    ForwardDelete,
    Escape,

    // Punctuation
    Minus,
    Equal,
    LeftBracket,
    RightBracket,
    Backslash,
    Semicolon,
    Quote,
    Comma,
    Period,
    Slash,
    Grave,

    // Modifiers
    LeftShift,
    RightShift,
    LeftControl,
    RightControl,
    LeftOption,
    RightOption,
    LeftCommand,
    RightCommand,
    CapsLock,
    Function,

    // Arrows
    LeftArrow,
    RightArrow,
    DownArrow,
    UpArrow,

    // Navigation
    Home,
    End,
    PageUp,
    PageDown,

    // Function row
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,

    // Media
    VolumeUp,
    VolumeDown,
    Mute,
}

impl VirtualKey {
    /// Platform virtual-key code (macOS `kVK_*`).
    pub const fn code(self) -> u16 {
        use VirtualKey::*;
        match self {
            A => 0x00,
            S => 0x01,
            D => 0x02,
            F => 0x03,
            H => 0x04,
            G => 0x05,
            Z => 0x06,
            X => 0x07,
            C => 0x08,
            V => 0x09,
            B => 0x0B,
            Q => 0x0C,
            W => 0x0D,
            E => 0x0E,
            R => 0x0F,
            Y => 0x10,
            T => 0x11,
            Num1 => 0x12,
            Num2 => 0x13,
            Num3 => 0x14,
            Num4 => 0x15,
            Num6 => 0x16,
            Num5 => 0x17,
            Equal => 0x18,
            Num9 => 0x19,
            Num7 => 0x1A,
            Minus => 0x1B,
            Num8 => 0x1C,
            Num0 => 0x1D,
            RightBracket => 0x1E,
            O => 0x1F,
            U => 0x20,
            LeftBracket => 0x21,
            I => 0x22,
            P => 0x23,
            Return => 0x24,
            L => 0x25,
            J => 0x26,
            Quote => 0x27,
            K => 0x28,
            Semicolon => 0x29,
            Backslash => 0x2A,
            Comma => 0x2B,
            Slash => 0x2C,
            N => 0x2D,
            M => 0x2E,
            Period => 0x2F,
            Tab => 0x30,
            Space => 0x31,
            Grave => 0x32,
            Backspace => 0x33,
            Escape => 0x35,
            RightCommand => 0x36,
            LeftCommand => 0x37,
            LeftShift => 0x38,
            CapsLock => 0x39,
            LeftOption => 0x3A,
            LeftControl => 0x3B,
            RightShift => 0x3C,
            RightOption => 0x3D,
            RightControl => 0x3E,
            Function => 0x3F,
            VolumeUp => 0x48,
            VolumeDown => 0x49,
            Mute => 0x4A,
            F5 => 0x60,
            F6 => 0x61,
            F7 => 0x62,
            F3 => 0x63,
            F8 => 0x64,
            F9 => 0x65,
            F11 => 0x67,
            F10 => 0x6D,
            F12 => 0x6F,
            Home => 0x73,
            PageUp => 0x74,
            ForwardDelete => 0x75,
            F4 => 0x76,
            End => 0x77,
            F2 => 0x78,
            PageDown => 0x79,
            F1 => 0x7A,
            LeftArrow => 0x7B,
            RightArrow => 0x7C,
            DownArrow => 0x7D,
            UpArrow => 0x7E,
        }
    }

    pub const fn is_modifier(self) -> bool {
        matches!(
            self,
            VirtualKey::LeftShift
                | VirtualKey::RightShift
                | VirtualKey::LeftControl
                | VirtualKey::RightControl
                | VirtualKey::LeftOption
                | VirtualKey::RightOption
                | VirtualKey::LeftCommand
                | VirtualKey::RightCommand
                | VirtualKey::Function
        )
    }

    /// Parse a key name as written in layouts and gesture action slots.
    /// Single letters and digits resolve directly; longer names are the
    /// lowercase forms used by the bundled presets.
    pub fn from_label(label: &str) -> Option<Self> {
        use VirtualKey::*;
        let l = label.trim().to_ascii_lowercase();
        let key = match l.as_str() {
            "a" => A,
            "b" => B,
            "c" => C,
            "d" => D,
            "e" => E,
            "f" => F,
            "g" => G,
            "h" => H,
            "i" => I,
            "j" => J,
            "k" => K,
            "l" => L,
            "m" => M,
            "n" => N,
            "o" => O,
            "p" => P,
            "q" => Q,
            "r" => R,
            "s" => S,
            "t" => T,
            "u" => U,
            "v" => V,
            "w" => W,
            "x" => X,
            "y" => Y,
            "z" => Z,
            "0" => Num0,
            "1" => Num1,
            "2" => Num2,
            "3" => Num3,
            "4" => Num4,
            "5" => Num5,
            "6" => Num6,
            "7" => Num7,
            "8" => Num8,
            "9" => Num9,
            "space" => Space,
            "return" | "enter" => Return,
            "tab" => Tab,
            "bksp" | "backspace" | "delete" => Backspace,
            "fwd delete" => ForwardDelete,
            "esc" | "escape" => Escape,
            "-" => Minus,
            "=" => Equal,
            "[" => LeftBracket,
            "]" => RightBracket,
            "\\" => Backslash,
            ";" => Semicolon,
            "'" => Quote,
            "," => Comma,
            "." => Period,
            "/" => Slash,
            "`" => Grave,
            "shift" => LeftShift,
            "rshift" => RightShift,
            "ctrl" | "control" => LeftControl,
            "rctrl" => RightControl,
            "opt" | "option" | "alt" => LeftOption,
            "ropt" => RightOption,
            "cmd" | "command" | "win" => LeftCommand,
            "rcmd" => RightCommand,
            "caps" => CapsLock,
            "fn" => Function,
            "left" => LeftArrow,
            "right" => RightArrow,
            "down" => DownArrow,
            "up" => UpArrow,
            "home" => Home,
            "end" => End,
            "pgup" => PageUp,
            "pgdn" => PageDown,
            "f1" => F1,
            "f2" => F2,
            "f3" => F3,
            "f4" => F4,
            "f5" => F5,
            "f6" => F6,
            "f7" => F7,
            "f8" => F8,
            "f9" => F9,
            "f10" => F10,
            "f11" => F11,
            "f12" => F12,
            "vol up" => VolumeUp,
            "vol down" => VolumeDown,
            "mute" => Mute,
            _ => return None,
        };
        Some(key)
    }
}
