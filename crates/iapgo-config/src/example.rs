/// Example configuration printed as part of the usage message.
pub const EXAMPLE_CONFIG: &str = r#"
# default will be used if no config section is specified
default:
  project_id: my-gcp-project
  zone: us-central1-a
  instance: my-jumpbox
  # If local_port is not set then an ephemeral port will be allocated and made available as $IAPGO_LISTEN_PORT
  # local_port: 1234
  remote_port: 80
  remote_nic: nic0
  exec:
    - bash
    - "-c"
    - curl http://localhost:$IAPGO_LISTEN_PORT
  # Exit as soon as the exec command finishes instead of waiting for Control-C
  terminate_after_exec: true
example:
  project_id: my-gcp-project
  zone: us-central1-a
  instance: my-jumpbox
  remote_port: 80 # When ssh_tunnel is used then this is the port on the tunnel_to host
  remote_nic: nic0
  ssh_tunnel:
    tunnel_to: 1.2.3.4 # This is a host that is reachable from my-jumpbox
    # If account_name is not set then an attempt will be made to get value from os-login
    # account_name: my_ssh_login
    # By default ~/.ssh/google_compute_engine will be used.
    # private_key_file: /home/fred/.ssh/google_compute_engine
    # If known_hosts_file is set then the jumpbox host key must be listed in it.
    # known_hosts_file: /home/fred/.ssh/known_hosts
  exec:
    - bash
    - "-c"
    # curl will reach ssh_tunnel.tunnel_to host on remote_port
    - curl http://localhost:$IAPGO_LISTEN_PORT
"#;
