/// Active contact/view tracking
///
/// At most one contact is selected, and the two auxiliary views (own profile,
/// contact detail panel) are mutually exclusive with each other and reset on
/// any selection change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    active: Option<String>,
    profile_open: bool,
    details_open: bool,
}

impl SelectionState {
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_active(&self, contact_id: &str) -> bool {
        self.active.as_deref() == Some(contact_id)
    }

    pub fn profile_open(&self) -> bool {
        self.profile_open
    }

    pub fn details_open(&self) -> bool {
        self.details_open
    }

    /// Make a contact the active selection, resetting both auxiliary views
    pub fn select(&mut self, contact_id: &str) {
        self.active = Some(contact_id.to_string());
        self.profile_open = false;
        self.details_open = false;
    }

    /// Clear the selection and both auxiliary views
    pub fn clear(&mut self) {
        self.active = None;
        self.profile_open = false;
        self.details_open = false;
    }

    pub fn open_profile(&mut self) {
        self.profile_open = true;
        self.details_open = false;
    }

    pub fn open_details(&mut self) {
        self.details_open = true;
        self.profile_open = false;
    }

    pub fn close_views(&mut self) {
        self.profile_open = false;
        self.details_open = false;
    }
}
