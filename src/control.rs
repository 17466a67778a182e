use winit::event::{ElementState, KeyboardInput, VirtualKeyCode, WindowEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Closing,
}

/// The window events the render loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    CloseRequested,
    Key {
        key: Option<VirtualKeyCode>,
        state: ElementState,
    },
}

impl Input {
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::CloseRequested => Some(Input::CloseRequested),
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        virtual_keycode,
                        state,
                        ..
                    },
                ..
            } => Some(Input::Key {
                key: *virtual_keycode,
                state: *state,
            }),
            _ => None,
        }
    }
}

impl LoopState {
    pub fn handle(self, input: Input) -> Self {
        match (self, input) {
            (LoopState::Closing, _) => LoopState::Closing,
            (LoopState::Running, Input::CloseRequested)
            | (
                LoopState::Running,
                Input::Key {
                    key: Some(VirtualKeyCode::Escape),
                    state: ElementState::Pressed,
                },
            ) => LoopState::Closing,
            (LoopState::Running, Input::Key { .. }) => LoopState::Running,
        }
    }

    /// Folds one batch of polled input into the next state.
    pub fn process<I>(self, batch: I) -> Self
    where
        I: IntoIterator<Item = Input>,
    {
        batch.into_iter().fold(self, LoopState::handle)
    }

    pub fn is_running(self) -> bool {
        self == LoopState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(key: VirtualKeyCode) -> Input {
        Input::Key {
            key: Some(key),
            state: ElementState::Pressed,
        }
    }

    #[test]
    fn escape_press_closes() {
        let state = LoopState::Running.process(vec![press(VirtualKeyCode::Escape)]);
        assert_eq!(state, LoopState::Closing);
    }

    #[test]
    fn other_keys_keep_running() {
        let batch = vec![
            press(VirtualKeyCode::A),
            press(VirtualKeyCode::Space),
            press(VirtualKeyCode::Q),
            Input::Key {
                key: None,
                state: ElementState::Pressed,
            },
        ];
        assert_eq!(LoopState::Running.process(batch), LoopState::Running);
    }

    #[test]
    fn escape_release_alone_does_not_close() {
        let batch = vec![Input::Key {
            key: Some(VirtualKeyCode::Escape),
            state: ElementState::Released,
        }];
        assert!(LoopState::Running.process(batch).is_running());
    }

    #[test]
    fn close_request_closes() {
        assert_eq!(
            LoopState::Running.process(vec![Input::CloseRequested]),
            LoopState::Closing
        );
    }

    #[test]
    fn closing_is_terminal() {
        let state = LoopState::Running.process(vec![
            press(VirtualKeyCode::Escape),
            press(VirtualKeyCode::A),
        ]);
        assert_eq!(state, LoopState::Closing);
        assert_eq!(state.process(vec![press(VirtualKeyCode::B)]), LoopState::Closing);
    }

    #[test]
    fn empty_batch_changes_nothing() {
        assert_eq!(LoopState::Running.process(Vec::new()), LoopState::Running);
    }
}
