//! Host-page selector tokens, kept in one place.
//!
//! All of these are reverse-engineered from the live conference page. None
//! are documented or stable; when the page ships a redesign, this is the
//! file to update.

/// Modern caption region: `role="region"` with `tabindex="0"`.
pub const CAPTION_REGION_ROLE: &str = "region";
pub const CAPTION_REGION_TABINDEX: &str = "0";

/// Pre-redesign caption container class.
pub const LEGACY_CAPTION_CLASS: &str = "a4cQT";

/// Chat live region: `aria-live="polite"` with this class.
pub const CHAT_REGION_CLASS: &str = "Ge9Kpc";
pub const CHAT_REGION_ARIA_LIVE: &str = "polite";

/// Element that eventually carries the local participant's display name.
pub const SELF_NAME_CLASS: &str = "awLEm";

/// Element that carries the meeting title once the page resolves it.
pub const MEETING_TITLE_CLASS: &str = "u6vdEc";

/// Icon font class used by the page's control affordances. The glyph name
/// is the element's text content.
pub const CONTROL_ICON_CLASS: &str = "google-symbols";
pub const END_CALL_GLYPH: &str = "call_end";
pub const CAPTIONS_GLYPH: &str = "closed_caption_off";
pub const CHAT_TOGGLE_GLYPH: &str = "chat";
